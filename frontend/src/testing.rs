/// Fixtures shared by unit tests across modules.
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{GameRef, Settings};

/// A native game with no plugin, hooks or artwork.
pub fn game(name: &str) -> GameRef {
    GameRef {
        name: name.to_string(),
        executable: PathBuf::from(format!("{}.exe", name.to_lowercase().replace(' ', "_"))),
        rom: None,
        plugin: None,
        parameters: String::new(),
        pre_launch: vec![],
        post_exit: vec![],
        splash: BTreeMap::new(),
        splash_duration_ms: None,
        marquee: None,
        controller_layout: None,
    }
}

/// Default settings with 160 ms fades (ten 16 ms animation ticks).
pub fn settings() -> Settings {
    Settings {
        fade_duration_ms: 160,
        ..Settings::default()
    }
}
