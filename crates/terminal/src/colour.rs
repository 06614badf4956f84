//! Colour model and fish-style colour-spec parsing.
//!
//! Ported from the env-heuristic and colour-downgrade logic the original
//! figterm used (`color.c`), expressed as pure functions so they can be
//! tested in isolation as spec.md's design notes call for.

/// Either a palette index or a 24-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colour {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Terminal colour-capability bitflags, mirroring `color_support_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColourSupport {
    pub term256: bool,
    pub term24bit: bool,
}

fn env_bool(value: &str) -> bool {
    matches!(value.chars().next(), Some('Y' | 'T' | 'y' | 't' | '1'))
}

/// Detect colour support from the environment, mirroring `get_color_support`.
pub fn detect_colour_support<F>(getenv: F) -> ColourSupport
where
    F: Fn(&str) -> Option<String>,
{
    let term = getenv("TERM");
    let mut term256 = false;
    if let Some(v) = getenv("fish_term256") {
        term256 = env_bool(&v);
    } else if let Some(t) = &term {
        if t.contains("256color") {
            term256 = true;
        } else if t.contains("xterm") {
            if getenv("TERM_PROGRAM").as_deref() == Some("Apple_Terminal") {
                if let Some(v) = getenv("TERM_PROGRAM_VERSION") {
                    if v.parse::<f64>().map(|n| n > 299.0).unwrap_or(false) {
                        term256 = true;
                    }
                }
            } else {
                term256 = true;
            }
        }
    }

    let mut term24bit = false;
    if let Some(v) = getenv("fish_term24bit") {
        term24bit = env_bool(&v);
    } else if getenv("STY").is_some() || term.as_deref().is_some_and(|t| t.starts_with("eterm")) {
        term24bit = false;
    } else if let Some(ct) = getenv("COLORTERM") {
        if ct == "truecolor" || ct == "24bit" {
            term24bit = true;
        }
    } else if getenv("KONSOLE_VERSION").is_some() || getenv("KONSOLE_PROFILE_NAME").is_some() {
        term24bit = true;
    } else if let Some(it) = getenv("ITERM_SESSION_ID") {
        if it.contains(':') {
            term24bit = true;
        }
    } else if term.as_deref().is_some_and(|t| t.starts_with("st-")) {
        term24bit = true;
    } else if let Some(vte) = getenv("VTE_VERSION") {
        if vte.parse::<f64>().map(|n| n > 3600.0).unwrap_or(false) {
            term24bit = true;
        }
    }

    ColourSupport { term256, term24bit }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsedColour {
    Named(u8),
    Rgb(u8, u8, u8),
}

fn parse_hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn try_parse_rgb(name: &str) -> Option<ParsedColour> {
    let name = name.strip_prefix('#').unwrap_or(name);
    let bytes = name.as_bytes();
    match bytes.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for i in 0..3 {
                let v = parse_hex_digit(bytes[i])?;
                rgb[i] = v * 16 + v;
            }
            Some(ParsedColour::Rgb(rgb[0], rgb[1], rgb[2]))
        }
        6 => {
            let mut rgb = [0u8; 3];
            for i in 0..3 {
                let hi = parse_hex_digit(bytes[i * 2])?;
                let lo = parse_hex_digit(bytes[i * 2 + 1])?;
                rgb[i] = hi * 16 + lo;
            }
            Some(ParsedColour::Rgb(rgb[0], rgb[1], rgb[2]))
        }
        _ => None,
    }
}

/// Keep sorted alphabetically, matching the original table.
const NAMED_COLOURS: &[(&str, u8)] = &[
    ("black", 0),
    ("blue", 4),
    ("brblack", 8),
    ("brblue", 12),
    ("brbrown", 11),
    ("brcyan", 14),
    ("brgreen", 10),
    ("brgrey", 8),
    ("brmagenta", 13),
    ("brown", 3),
    ("brpurple", 13),
    ("brred", 9),
    ("brwhite", 15),
    ("bryellow", 11),
    ("cyan", 6),
    ("green", 2),
    ("grey", 7),
    ("magenta", 5),
    ("purple", 5),
    ("red", 1),
    ("white", 7),
    ("yellow", 3),
];

fn try_parse_named(name: &str) -> Option<ParsedColour> {
    let lower = name.to_ascii_lowercase();
    NAMED_COLOURS
        .binary_search_by_key(&lower.as_str(), |(n, _)| n)
        .ok()
        .map(|idx| ParsedColour::Named(NAMED_COLOURS[idx].1))
}

const TERM16_RGB: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x80, 0x00, 0x00),
    (0x00, 0x80, 0x00),
    (0x80, 0x80, 0x00),
    (0x00, 0x00, 0x80),
    (0x80, 0x00, 0x80),
    (0x00, 0x80, 0x80),
    (0xc0, 0xc0, 0xc0),
    (0x80, 0x80, 0x80),
    (0xff, 0x00, 0x00),
    (0x00, 0xff, 0x00),
    (0xff, 0xff, 0x00),
    (0x00, 0x00, 0xff),
    (0xff, 0x00, 0xff),
    (0x00, 0xff, 0xff),
    (0xff, 0xff, 0xff),
];

fn squared_diff(a: u8, b: u8) -> u32 {
    let d = a as i32 - b as i32;
    (d * d) as u32
}

fn nearest(rgb: (u8, u8, u8), palette: &[(u8, u8, u8)]) -> u8 {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, &(r, g, b))| {
            squared_diff(rgb.0, r) + squared_diff(rgb.1, g) + squared_diff(rgb.2, b)
        })
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}

fn term16_for_rgb(rgb: (u8, u8, u8)) -> u8 {
    nearest(rgb, &TERM16_RGB)
}

fn term256_cube() -> Vec<(u8, u8, u8)> {
    const STEPS: [u8; 6] = [0x00, 0x5f, 0x87, 0xaf, 0xd7, 0xff];
    let mut colours = Vec::with_capacity(216 + 24);
    for r in STEPS {
        for g in STEPS {
            for b in STEPS {
                colours.push((r, g, b));
            }
        }
    }
    for i in 0..24u8 {
        let v = 8 + i * 10;
        colours.push((v, v, v));
    }
    colours
}

fn term256_for_rgb(rgb: (u8, u8, u8)) -> u8 {
    16 + nearest(rgb, &term256_cube())
}

fn to_colour(c: ParsedColour, support: ColourSupport) -> Colour {
    match c {
        ParsedColour::Named(idx) => Colour::Indexed(idx),
        ParsedColour::Rgb(r, g, b) => {
            if support.term24bit {
                Colour::Rgb(r, g, b)
            } else if support.term256 {
                Colour::Indexed(term256_for_rgb((r, g, b)))
            } else {
                Colour::Indexed(term16_for_rgb((r, g, b)))
            }
        }
    }
}

/// Parse a fish-style colour spec (space-delimited tokens, first RGB and
/// first named colour win, `-`-prefixed tokens skipped), matching fish's
/// `output.cpp:parse_color`.
pub fn parse_fish_colour(spec: &str, support: ColourSupport) -> Option<Colour> {
    let mut first_rgb = None;
    let mut first_named = None;
    for token in spec.split_whitespace() {
        if token.starts_with('-') {
            continue;
        }
        let parsed = try_parse_named(token).or_else(|| try_parse_rgb(token));
        match parsed {
            Some(c @ ParsedColour::Rgb(..)) if first_rgb.is_none() => first_rgb = Some(c),
            Some(c @ ParsedColour::Named(_)) if first_named.is_none() => first_named = Some(c),
            _ => {}
        }
    }

    let chosen = if (first_rgb.is_some() && support.term256) || first_named.is_none() {
        first_rgb
    } else {
        first_named
    };
    chosen.map(|c| to_colour(c, support))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_colour() {
        let support = ColourSupport { term256: true, term24bit: true };
        assert_eq!(parse_fish_colour("red", support), Some(Colour::Indexed(1)));
    }

    #[test]
    fn parses_hex_rgb_prefers_truecolor() {
        let support = ColourSupport { term256: true, term24bit: true };
        assert_eq!(
            parse_fish_colour("#ff00ff", support),
            Some(Colour::Rgb(0xff, 0x00, 0xff))
        );
    }

    #[test]
    fn downgrades_rgb_without_term256() {
        let support = ColourSupport { term256: false, term24bit: false };
        match parse_fish_colour("#ff00ff", support) {
            Some(Colour::Indexed(_)) => {}
            other => panic!("expected indexed downgrade, got {other:?}"),
        }
    }

    #[test]
    fn three_hex_digit_shorthand_expands() {
        let support = ColourSupport { term256: true, term24bit: true };
        assert_eq!(
            parse_fish_colour("fa3", support),
            Some(Colour::Rgb(0xff, 0xaa, 0x33))
        );
    }

    #[test]
    fn skips_dash_prefixed_tokens() {
        let support = ColourSupport { term256: true, term24bit: true };
        assert_eq!(
            parse_fish_colour("-b red", support),
            Some(Colour::Indexed(1))
        );
    }

    #[test]
    fn detects_256color_from_term() {
        let support = detect_colour_support(|key| match key {
            "TERM" => Some("xterm-256color".to_string()),
            _ => None,
        });
        assert!(support.term256);
    }

    #[test]
    fn detects_truecolor_from_colorterm() {
        let support = detect_colour_support(|key| match key {
            "COLORTERM" => Some("truecolor".to_string()),
            _ => None,
        });
        assert!(support.term24bit);
    }
}
