use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One output asset in a pack manifest: a relative path and a pixel size
/// (icons are always square, so one size covers both dimensions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconSpec {
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

impl IconSpec {
    pub fn square(filename: &str, size: u32) -> Self {
        Self {
            filename: filename.to_string(),
            width: size,
            height: size,
        }
    }
}

/// A named, fixed manifest of outputs generated from one high-resolution
/// source. Built-in presets ship with the binary; user presets are merged
/// over them by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Stable identifier, unique across built-in and user presets.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub icons: Vec<IconSpec>,
}

/// Resolution ladder packaged into a single multi-resolution .ico container.
pub const ICO_SIZES: [u32; 6] = [256, 128, 64, 48, 32, 16];

/// Favicon triad bundled by the web pack into a small .ico.
pub const FAVICON_SIZES: [u32; 3] = [16, 32, 48];

/// Web icon pack: favicons plus the touch/chrome sizes browsers ask for.
pub fn web_pack() -> Vec<IconSpec> {
    vec![
        IconSpec::square("favicon-16x16.png", 16),
        IconSpec::square("favicon-32x32.png", 32),
        IconSpec::square("favicon-96x96.png", 96),
        IconSpec::square("apple-touch-icon.png", 180),
        IconSpec::square("android-chrome-192x192.png", 192),
        IconSpec::square("android-chrome-512x512.png", 512),
    ]
}

/// Android-style launcher pack: one icon per density bucket plus the
/// 512px store listing image.
pub fn android_pack() -> Vec<IconSpec> {
    vec![
        IconSpec::square("mipmap-mdpi/ic_launcher.png", 48),
        IconSpec::square("mipmap-hdpi/ic_launcher.png", 72),
        IconSpec::square("mipmap-xhdpi/ic_launcher.png", 96),
        IconSpec::square("mipmap-xxhdpi/ic_launcher.png", 144),
        IconSpec::square("mipmap-xxxhdpi/ic_launcher.png", 192),
        IconSpec::square("playstore.png", 512),
    ]
}

/// iOS-style app icon pack: the point sizes at 1x/2x/3x scales.
pub fn ios_pack() -> Vec<IconSpec> {
    vec![
        IconSpec::square("Icon-20.png", 20),
        IconSpec::square("Icon-29.png", 29),
        IconSpec::square("Icon-40.png", 40),
        IconSpec::square("Icon-58.png", 58),
        IconSpec::square("Icon-60.png", 60),
        IconSpec::square("Icon-76.png", 76),
        IconSpec::square("Icon-80.png", 80),
        IconSpec::square("Icon-87.png", 87),
        IconSpec::square("Icon-120.png", 120),
        IconSpec::square("Icon-152.png", 152),
        IconSpec::square("Icon-167.png", 167),
        IconSpec::square("Icon-180.png", 180),
        IconSpec::square("Icon-1024.png", 1024),
    ]
}

/// Built-in store-pack presets, keyed by id.
///
/// IndexMap keeps the declaration order for stable listing in the CLI.
pub fn builtin_presets() -> IndexMap<String, Preset> {
    let presets = vec![
        Preset {
            id: "msstore".to_string(),
            name: "Microsoft Store".to_string(),
            description: "Tile and logo sizes for a Microsoft Store listing".to_string(),
            icons: vec![
                IconSpec::square("Square44x44Logo.png", 44),
                IconSpec::square("Square71x71Logo.png", 71),
                IconSpec::square("Square150x150Logo.png", 150),
                IconSpec::square("Square310x310Logo.png", 310),
                IconSpec {
                    filename: "Wide310x150Logo.png".to_string(),
                    width: 310,
                    height: 150,
                },
                IconSpec::square("StoreLogo.png", 50),
            ],
        },
        Preset {
            id: "webstore".to_string(),
            name: "Chrome Web Store".to_string(),
            description: "Icon and promotional tile sizes for a Chrome Web Store listing"
                .to_string(),
            icons: vec![
                IconSpec::square("icon-128.png", 128),
                IconSpec {
                    filename: "small-tile.png".to_string(),
                    width: 440,
                    height: 280,
                },
                IconSpec {
                    filename: "large-tile.png".to_string(),
                    width: 920,
                    height: 680,
                },
                IconSpec {
                    filename: "marquee.png".to_string(),
                    width: 1400,
                    height: 560,
                },
            ],
        },
        Preset {
            id: "social".to_string(),
            name: "Social Media".to_string(),
            description: "Avatar and banner sizes for common social platforms".to_string(),
            icons: vec![
                IconSpec::square("avatar-400.png", 400),
                IconSpec {
                    filename: "og-image.png".to_string(),
                    width: 1200,
                    height: 630,
                },
                IconSpec {
                    filename: "banner.png".to_string(),
                    width: 1500,
                    height: 500,
                },
            ],
        },
    ];

    presets.into_iter().map(|p| (p.id.clone(), p)).collect()
}

/// Merge user-defined presets over the built-ins.
///
/// A user preset with a built-in id replaces that built-in's contents, but
/// built-ins can never be removed: every built-in id survives the merge.
pub fn merge_presets(user: Vec<Preset>) -> IndexMap<String, Preset> {
    let mut merged = builtin_presets();
    for preset in user {
        merged.insert(preset.id.clone(), preset);
    }
    merged
}
