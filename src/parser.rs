use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing release names or durations.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid input: {0:?}")]
    Invalid(String),

    #[error("invalid roman numeral: {0:?}")]
    InvalidNumeral(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
}

/// Structured metadata extracted from a release name.
///
/// A `Media` with an empty name is considered empty and compares unequal to
/// everything, including itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Media {
    pub release: String,
    pub name: String,
    pub year: i32,
    pub season: u32,
    pub episode: u32,
    pub resolution: String,
    pub codec: String,
}

impl Media {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Logical equality used by the deduplicator: both sides must be
    /// non-empty and agree on name, season, episode and year.
    pub fn equal(&self, other: &Media) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.name == other.name
            && self.season == other.season
            && self.episode == other.episode
            && self.year == other.year
    }

    pub fn replace_name(&mut self, pattern: &Regex, replacement: &str) {
        self.name = pattern.replace_all(&self.name, replacement).into_owned();
    }
}

/// Which parsing strategy a profile applies to release names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Default,
    Movie,
    Show,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Movie => "movie",
            Self::Show => "show",
        }
    }
}

/// Release-name parser with patterns compiled once at construction.
///
/// Held as a field of each profile; there is no shared module-level state.
#[derive(Debug, Clone)]
pub struct MediaParser {
    kind: ParserKind,
    movie_pattern: Regex,
    episode_patterns: [Regex; 4],
    split_pattern: Regex,
}

impl MediaParser {
    pub fn new(kind: ParserKind) -> Self {
        Self {
            kind,
            movie_pattern: Regex::new(r"(.*?)\.(\d{4})").expect("invalid movie regex"),
            episode_patterns: [
                // S01, S01E04
                Regex::new(r"^(?P<name>.+?)\.[Ss](?P<season>\d{2})(?:[Ee](?P<episode>\d{2}))?")
                    .expect("invalid episode regex"),
                // E04
                Regex::new(r"^(?P<name>.+?)\.[Ee](?P<episode>\d{2})")
                    .expect("invalid episode regex"),
                // 1x04, 01x04
                Regex::new(r"^(?P<name>.+?)\.(?P<season>\d{1,2})x(?P<episode>\d{2})")
                    .expect("invalid episode regex"),
                // P(ar)t(.)11, Pt(.)XI
                Regex::new(r"^(?P<name>.+?)\.P(?:ar)?t\.?(?P<episode>[^.]+)")
                    .expect("invalid episode regex"),
            ],
            split_pattern: Regex::new(r"[-_.]").expect("invalid split regex"),
        }
    }

    pub fn kind(&self) -> ParserKind {
        self.kind
    }

    pub fn parse(&self, s: &str) -> Result<Media, ParseError> {
        match self.kind {
            ParserKind::Default => Ok(Media {
                release: s.to_string(),
                ..Media::default()
            }),
            ParserKind::Movie => self.parse_movie(s),
            ParserKind::Show => self.parse_show(s),
        }
    }

    fn parse_movie(&self, s: &str) -> Result<Media, ParseError> {
        let caps = self
            .movie_pattern
            .captures(s)
            .ok_or_else(|| ParseError::Invalid(s.to_string()))?;
        let name = caps[1].to_string();
        let year: i32 = caps[2]
            .parse()
            .map_err(|_| ParseError::Invalid(s.to_string()))?;
        Ok(Media {
            release: s.to_string(),
            name,
            year,
            resolution: self.find_token(s, is_resolution),
            codec: self.find_token(s, is_codec),
            ..Media::default()
        })
    }

    fn parse_show(&self, s: &str) -> Result<Media, ParseError> {
        for pattern in &self.episode_patterns {
            let Some(caps) = pattern.captures(s) else {
                continue;
            };
            let mut name = caps
                .name("name")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let season = match caps.name("season") {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| ParseError::Invalid(s.to_string()))?,
                None => 1,
            };
            let episode = match caps.name("episode") {
                Some(m) => match m.as_str().parse() {
                    Ok(n) => n,
                    Err(_) => roman_to_int(m.as_str())?,
                },
                None => 0,
            };
            if name.to_lowercase() == name && !name.is_empty() {
                // Capitalize all-lowercase names
                let mut chars = name.chars();
                let first = chars.next().unwrap_or_default();
                name = first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase();
            }
            return Ok(Media {
                release: s.to_string(),
                name,
                season,
                episode,
                resolution: self.find_token(s, is_resolution),
                codec: self.find_token(s, is_codec),
                ..Media::default()
            });
        }
        Err(ParseError::Invalid(s.to_string()))
    }

    fn find_token(&self, s: &str, matches: fn(&str) -> bool) -> String {
        let lower = s.to_lowercase();
        self.split_pattern
            .split(&lower)
            .find(|part| matches(part))
            .unwrap_or_default()
            .to_string()
    }
}

fn is_resolution(part: &str) -> bool {
    matches!(part, "720p" | "1080p" | "2160p")
}

fn is_codec(part: &str) -> bool {
    matches!(part, "h264" | "h265" | "xvid" | "x264" | "x265")
}

const ROMAN_PAIRS: [(&str, u32); 13] = [
    ("M", 1000),
    ("CM", 900),
    ("D", 500),
    ("CD", 400),
    ("C", 100),
    ("XC", 90),
    ("L", 50),
    ("XL", 40),
    ("X", 10),
    ("IX", 9),
    ("V", 5),
    ("IV", 4),
    ("I", 1),
];

fn int_to_roman(mut n: u32) -> String {
    let mut out = String::new();
    for (symbol, value) in ROMAN_PAIRS {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

/// Decode a roman numeral in the I..MMM range using standard subtractive
/// rules. Malformed numerals (wrong ordering, over-repetition) are rejected
/// by re-encoding the value and comparing against the input.
fn roman_to_int(s: &str) -> Result<u32, ParseError> {
    let value_of = |c: char| -> Option<u32> {
        Some(match c {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        })
    };
    let values: Vec<u32> = s
        .chars()
        .map(value_of)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ParseError::InvalidNumeral(s.to_string()))?;
    if values.is_empty() {
        return Err(ParseError::InvalidNumeral(s.to_string()));
    }
    // Signed accumulator: subtractive pairs like IV subtract before anything
    // has been added.
    let mut sum: i64 = 0;
    for (i, v) in values.iter().enumerate() {
        if values[i + 1..].iter().any(|next| next > v) {
            sum -= i64::from(*v);
        } else {
            sum += i64::from(*v);
        }
    }
    if sum <= 0 || sum > 3000 || int_to_roman(sum as u32) != s {
        return Err(ParseError::InvalidNumeral(s.to_string()));
    }
    Ok(sum as u32)
}

/// Format a duration in whole seconds the way Go renders `time.Duration`
/// ("48h0m0s", "30m0s", "45s"). Reason strings in the classifier depend on
/// this exact shape.
pub fn format_duration(secs: i64) -> String {
    let mut out = String::new();
    if secs < 0 {
        out.push('-');
    }
    let total = secs.unsigned_abs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        out.push_str(&format!("{hours}h{minutes}m{seconds}s"));
    } else if minutes > 0 {
        out.push_str(&format!("{minutes}m{seconds}s"));
    } else {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// Parse a duration like "24h", "1h30m" or "90s" into whole seconds.
/// "0" means no limit.
pub fn parse_duration(input: &str) -> Result<i64, ParseError> {
    if input == "0" {
        return Ok(0);
    }
    let mut total: i64 = 0;
    let mut digits = String::new();
    let mut seen_unit = false;
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits
            .parse()
            .map_err(|_| ParseError::InvalidDuration(input.to_string()))?;
        digits.clear();
        seen_unit = true;
        total += match c {
            'h' => n * 3600,
            'm' => n * 60,
            's' => n,
            _ => return Err(ParseError::InvalidDuration(input.to_string())),
        };
    }
    if !digits.is_empty() || !seen_unit {
        return Err(ParseError::InvalidDuration(input.to_string()));
    }
    Ok(total)
}
