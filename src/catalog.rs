//! Static catalog of optional components
//!
//! Built once at startup as an ordered map from component id to [`App`].
//! Declaration order is presentation and execution order, hence the
//! IndexMap. The engine never looks inside this module; it only receives
//! the apps the user selected.

use indexmap::IndexMap;

use crate::hardware;
use crate::payload::{App, BinaryOption, Payload};

/// Ordered component id -> App mapping.
pub type Catalog = IndexMap<String, App>;

const FLATHUB_SCRIPT: &str = "sudo flatpak remote-add --if-not-exists flathub \
    https://dl.flathub.org/repo/flathub.flatpakrepo";

// Runs after the package batches so the desktop entry exists. The option
// flag selects the integrated GPU for Optimus laptops.
const STEAM_OPTIMUS_SCRIPT: &str = r#"
if [ "$LODESTAR_OPTION" = "1" ]; then
    echo "Patching Steam to start on the integrated GPU"
    sudo sed -i 's|^Exec=/usr/bin/steam|Exec=env DRI_PRIME=0 /usr/bin/steam|' \
        /usr/share/applications/steam.desktop
fi
"#;

/// Build the default component catalog.
pub fn default_catalog() -> Catalog {
    let mut catalog = Catalog::new();

    catalog.insert(
        "flathub".to_string(),
        App::new(
            "Flathub",
            "Enable the Flathub application repository",
            vec![Payload::script(FLATHUB_SCRIPT).with_priority(-1)],
        )
        .with_category("Repositories"),
    );

    catalog.insert(
        "nvidia".to_string(),
        App::new(
            "NVIDIA Drivers",
            "Install NVIDIA drivers",
            vec![Payload::procedure(hardware::setup_nvidia)],
        )
        .with_option(BinaryOption::new("Set NVIDIA GPU as primary GPU"))
        .with_category("Drivers"),
    );

    catalog.insert(
        "broadcom".to_string(),
        App::new(
            "Broadcom Drivers",
            "Install Broadcom wifi and bluetooth drivers",
            vec![Payload::procedure(hardware::setup_broadcom)],
        )
        .with_category("Drivers"),
    );

    catalog.insert(
        "codecs".to_string(),
        App::new(
            "Multimedia Codecs",
            "Swap the crippled H.264 decoder for the full one and add codec plugins",
            vec![
                Payload::package_removal("noopenh264"),
                Payload::package("openh264"),
                Payload::package("mozilla-openh264"),
                Payload::package("gstreamer1-plugin-openh264"),
                Payload::package("lame"),
            ],
        )
        .with_category("Multimedia"),
    );

    catalog.insert(
        "steam".to_string(),
        App::new(
            "Steam",
            "The Steam gaming platform",
            vec![
                Payload::package("steam"),
                Payload::script(STEAM_OPTIMUS_SCRIPT).with_priority(1),
            ],
        )
        .with_option(BinaryOption::new("Don't start with dedicated GPU (Optimus patch)"))
        .with_category("Gaming"),
    );

    catalog.insert(
        "obs".to_string(),
        App::new(
            "OBS Studio",
            "Screen recording and streaming",
            vec![Payload::image("com.obsproject.Studio")],
        )
        .with_category("Multimedia"),
    );

    catalog.insert(
        "bottles".to_string(),
        App::new(
            "Bottles",
            "Run Windows software through managed Wine prefixes",
            vec![Payload::image("com.usebottles.bottles")],
        )
        .with_category("Gaming"),
    );

    catalog
}
