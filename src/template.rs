use crate::parser::Media;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unknown template field: {0:?}")]
    UnknownField(String),

    #[error("template field {field} is empty for {release:?}")]
    EmptyField { field: &'static str, release: String },
}

/// The media fields a destination template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaField {
    Release,
    Name,
    Year,
    Season,
    Episode,
    Resolution,
    Codec,
}

impl MediaField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Release" => Self::Release,
            "Name" => Self::Name,
            "Year" => Self::Year,
            "Season" => Self::Season,
            "Episode" => Self::Episode,
            "Resolution" => Self::Resolution,
            "Codec" => Self::Codec,
            _ => return None,
        })
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "Release",
            Self::Name => "Name",
            Self::Year => "Year",
            Self::Season => "Season",
            Self::Episode => "Episode",
            Self::Resolution => "Resolution",
            Self::Codec => "Codec",
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(MediaField),
}

/// Destination path template with `{{Field}}` placeholders, compiled once at
/// configuration load.
///
/// Rendering follows rsync semantics: a rendered path ending in a separator
/// places the release inside that directory under its own leaf name,
/// otherwise the rendered path is the exact destination.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template, rejecting unknown placeholder names up front.
    pub fn compile(raw: &str) -> Result<Self, TemplateError> {
        let placeholder = Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("invalid placeholder regex");
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(raw) {
            let whole = caps.get(0).expect("capture 0 always present");
            if whole.start() > last {
                segments.push(Segment::Literal(raw[last..whole.start()].to_string()));
            }
            let name = &caps[1];
            let field = MediaField::from_name(name)
                .ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));
            last = whole.end();
        }
        if last < raw.len() {
            segments.push(Segment::Literal(raw[last..].to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Render the template for `media`. Referencing a field the parser left
    /// empty (or zero, for Year and Season) is an error; the text surfaces as
    /// the rejection reason of the affected item.
    pub fn render(&self, media: &Media) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(field) => {
                    let value = match field {
                        MediaField::Release => media.release.clone(),
                        MediaField::Name => media.name.clone(),
                        MediaField::Resolution => media.resolution.clone(),
                        MediaField::Codec => media.codec.clone(),
                        MediaField::Year if media.year != 0 => media.year.to_string(),
                        MediaField::Season if media.season != 0 => media.season.to_string(),
                        MediaField::Episode => media.episode.to_string(),
                        MediaField::Year | MediaField::Season => String::new(),
                    };
                    if value.is_empty() {
                        return Err(TemplateError::EmptyField {
                            field: field.as_str(),
                            release: media.release.clone(),
                        });
                    }
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }

    /// Render the destination path for `remote_path`, applying the trailing
    /// separator rule.
    pub fn resolve(&self, remote_path: &str, media: &Media) -> Result<String, TemplateError> {
        let mut path = self.render(media)?;
        if path.ends_with('/') {
            path.push_str(base_name(remote_path));
        }
        Ok(path)
    }
}

/// Last path component, ignoring a trailing separator.
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
