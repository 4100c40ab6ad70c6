//! Best-effort track number guessing from file names.
//!
//! Only high-confidence patterns are acted on; anything ambiguous yields 0.
//! Patterns are tried in order against the base name with its extension
//! removed:
//!
//! 1. `#<marker>_<NN>_<rest>`: the second number wins (`#11_12_Chelovek`)
//! 2. a leading number followed by whitespace, `.`, `-` or `)` and more text
//!    (`05 Iron Head`, `14. War Machine`, `06)Slither`)
//! 3. a number in matching brackets with text on both sides
//!    (`METALLICA - (04) One`, `Fatboy Slim - [14] Brimful Of Asha`)
//! 4. a number between two ` - ` delimiters (`Iron Maiden - 7 - Quest For Fire`)
//! 5. a number between two bare hyphens (`Nightwish-07-Ocean_Soul`)
//! 6. a number after ` - ` glued to underscores (`[Iron Maiden] - 06__Wasting love`)

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static MARKED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[^_\s]+_([0-9]+)_.+$").expect("valid regex"));

static LEADING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)[\s.\-)].+$").expect("valid regex"));

static BRACKETED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+(?:\[([0-9]+)\]|\(([0-9]+)\)).+$").expect("valid regex")
});

static SPACED_DASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+ - ([0-9]+) - .+$").expect("valid regex"));

static BARE_DASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-([0-9]+)-.+$").expect("valid regex"));

static UNDERSCORED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+ - ([0-9]+)_+.+$").expect("valid regex"));

/// Guess the track number of a media file from its name.
///
/// Directory components and the extension are ignored. Returns 0 when no
/// unambiguous pattern matches.
///
/// ```
/// use music_indexer::metadata::guess_track_number;
///
/// assert_eq!(guess_track_number("/music/Rob Zombie/05 Iron Head.mp3"), 5);
/// assert_eq!(guess_track_number("B4 - Whole Lotta Rosie.mp3"), 0);
/// ```
pub fn guess_track_number(file_name: &str) -> u32 {
    let Some(stem) = Path::new(file_name).file_stem().and_then(|s| s.to_str()) else {
        return 0;
    };

    let patterns: [&Regex; 6] = [
        &MARKED_PATTERN,
        &LEADING_PATTERN,
        &BRACKETED_PATTERN,
        &SPACED_DASH_PATTERN,
        &BARE_DASH_PATTERN,
        &UNDERSCORED_PATTERN,
    ];

    patterns
        .iter()
        .find_map(|pattern| {
            let captures = pattern.captures(stem)?;
            // The bracketed pattern has one group per bracket style
            let number = captures.iter().skip(1).flatten().next()?;
            number.as_str().parse::<u32>().ok()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_structures() {
        let cases = [
            ("/Users/iron4o/Music/Rob Zombie/The Sinister Urge/05 Iron Head.mp3", 5),
            ("/Users/iron4o//05 Iron Head.mp3", 5),
            ("/home/iron4o//05 Iron Head.mp3", 5),
            ("05 Iron Head.mp3", 5),
        ];
        for (name, expected) in cases {
            assert_eq!(guess_track_number(name), expected, "guessing {name:?}");
        }
    }

    #[test]
    fn test_number_styles() {
        let cases = [
            ("14. War Machine.mp3", 14),
            ("06 - Back In Black.mp3", 6),
            ("05 Counterstrike.mp3", 5),
            ("05\tCounterstrike.mp3", 5),
            ("01.Ahat - Chernata ovtsa.mp3", 1),
            ("03-in_a_gadda_da_vida_iron_butterfly_cover.mp3", 3),
            ("8 Iron Maiden - Charlotte The Harlot.mp3", 8),
            ("Iron Maiden - 7 - Quest For Fire.mp3", 7),
            ("[Iron Maiden] - 06__Wasting love.mp3", 6),
            ("METALLICA - (04) One.mp3", 4),
            ("06)Slither.mp3", 6),
            ("#11_12_Chelovek na Lune.mp3", 12),
            ("#1_05_Nikto ne poverit.mp3", 5),
            ("Nightwish-07-Ocean_Soul.mp3", 7),
            ("nightwish -10- Beauty Of The Beast.mp3", 10),
            ("Fatboy Slim - [14] Brimful Of Asha (Cornershop).mp3", 14),
        ];
        for (name, expected) in cases {
            assert_eq!(guess_track_number(name), expected, "guessing {name:?}");
        }
    }

    #[test]
    fn test_traps_return_zero() {
        let traps = [
            "B4 - Whole Lotta Rosie.mp3",
            "Guns N' Roses - Estranged.mp3",
            "Apollo 440 - Stop The Rock.mp3",
            "Blur - Song 2.mp3",
            "D2 - Ledeno Momiche.mp3",
            "Factory 81- Insane in the Membrane.mp3",
            "Five For Fighting - 100 Years.mp3",
            "Heineken 2006 - Teddybears Sthlm & Mad Cobra - Cobrastyle.mp3",
            "Rob Zombie - Quake 2 Theme Song.mp3",
            "The Connells - '74-'75.mp3",
            "TONKO-1 - Druss,druss.mp3",
            "",
            "- 5 -",
            "3",
            "3.",
            "/Users/iron4o/",
        ];
        for name in traps {
            assert_eq!(guess_track_number(name), 0, "trap {name:?}");
        }
    }

    #[test]
    fn test_bracketed_number_alone_is_rejected() {
        assert_eq!(guess_track_number("[7].mp3"), 0);
        assert_eq!(guess_track_number("(7).mp3"), 0);
        assert_eq!(guess_track_number("Song [7.mp3"), 0);
    }

    #[test]
    fn test_overflowing_number_is_ignored() {
        assert_eq!(guess_track_number("99999999999999999999 Song.mp3"), 0);
    }
}
