use crate::parser::{self, Media, MediaParser, ParseError, ParserKind};
use crate::template::{base_name, PathTemplate, TemplateError};
use camino::Utf8Path;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Configuration failures abort the run before any queue is built.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("site {site}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        site: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("profile {profile}: invalid replacement pattern {pattern:?}: {source}")]
    InvalidReplacement {
        profile: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("profile {profile}: invalid template {template:?}: {source}")]
    InvalidTemplate {
        profile: String,
        template: String,
        source: TemplateError,
    },

    #[error("site {site}: invalid max_age {value:?}: {source}")]
    InvalidMaxAge {
        site: String,
        value: String,
        source: ParseError,
    },

    #[error("site {site}: unknown profile {profile:?}")]
    UnknownProfile { site: String, profile: String },

    #[error("site {site}: missing required field {field}")]
    MissingField { site: String, field: &'static str },

    #[error("site not found in config: {0}")]
    UnknownSite(String),

    #[error("cannot resolve site for import line {0:?}")]
    UnresolvedImport(String),
}

/// Item-local failure while resolving a remote path against a profile.
/// Never aborts a run; the text becomes the item's rejection reason.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Ordered name-replacement rule, applied to parsed names before any
/// equality or templating use.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub pattern: Regex,
    pub replacement: String,
}

/// Named bundle of parser, destination template and replacement rules.
/// Multiple sites may share one profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub parser: MediaParser,
    pub template: PathTemplate,
    pub replacements: Vec<Replacement>,
}

impl Profile {
    /// Resolve a remote path to its media and local destination path.
    pub fn resolve(&self, remote_path: &str) -> Result<(Media, String), ResolveError> {
        let mut media = self.parser.parse(base_name(remote_path))?;
        for rule in &self.replacements {
            media.replace_name(&rule.pattern, &rule.replacement);
        }
        let local_path = self.template.resolve(remote_path, &media)?;
        Ok((media, local_path))
    }
}

/// A remote site with its rule chain, compiled once at load time and passed
/// explicitly; there are no module-level pattern singletons.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    pub dirs: Vec<String>,
    /// Maximum entry age in seconds; 0 disables the age check.
    pub max_age_secs: i64,
    pub patterns: Vec<Regex>,
    pub filters: Vec<Regex>,
    /// Ordered priority patterns, index 0 = highest rank. Deduplication runs
    /// only when this is non-empty.
    pub priorities: Vec<Regex>,
    pub skip_symlinks: bool,
    pub skip_files: bool,
    pub skip_existing: bool,
    pub merge: bool,
    pub skip: bool,
    pub post_command: Option<String>,
    pub transfer_verb: String,
    pub profile: Arc<Profile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawReplacement {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProfile {
    #[serde(default)]
    parser: Option<ParserKind>,
    template: String,
    #[serde(default)]
    replacements: Vec<RawReplacement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSite {
    name: Option<String>,
    dirs: Option<Vec<String>>,
    max_age: Option<String>,
    patterns: Option<Vec<String>>,
    filters: Option<Vec<String>>,
    priorities: Option<Vec<String>>,
    skip_symlinks: Option<bool>,
    skip_files: Option<bool>,
    skip_existing: Option<bool>,
    merge: Option<bool>,
    skip: Option<bool>,
    post_command: Option<String>,
    transfer_verb: Option<String>,
    profile: Option<String>,
}

impl RawSite {
    /// Overlay this site on top of the shared defaults; site-local values win.
    fn merged_with(&self, default: &RawSite) -> RawSite {
        RawSite {
            name: self.name.clone().or_else(|| default.name.clone()),
            dirs: self.dirs.clone().or_else(|| default.dirs.clone()),
            max_age: self.max_age.clone().or_else(|| default.max_age.clone()),
            patterns: self.patterns.clone().or_else(|| default.patterns.clone()),
            filters: self.filters.clone().or_else(|| default.filters.clone()),
            priorities: self
                .priorities
                .clone()
                .or_else(|| default.priorities.clone()),
            skip_symlinks: self.skip_symlinks.or(default.skip_symlinks),
            skip_files: self.skip_files.or(default.skip_files),
            skip_existing: self.skip_existing.or(default.skip_existing),
            merge: self.merge.or(default.merge),
            skip: self.skip.or(default.skip),
            post_command: self
                .post_command
                .clone()
                .or_else(|| default.post_command.clone()),
            transfer_verb: self
                .transfer_verb
                .clone()
                .or_else(|| default.transfer_verb.clone()),
            profile: self.profile.clone().or_else(|| default.profile.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    default: RawSite,
    #[serde(default)]
    profiles: IndexMap<String, RawProfile>,
    #[serde(default)]
    sites: Vec<RawSite>,
}

/// Loaded configuration: compiled profiles and sites. Everything that can
/// fail (patterns, templates, durations, profile references) fails here,
/// before any queue is built.
#[derive(Debug, Clone)]
pub struct Config {
    pub profiles: IndexMap<String, Arc<Profile>>,
    pub sites: Vec<Site>,
    raw: RawConfig,
}

impl Config {
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        tracing::info!(
            "loaded config from {}: {} profiles, {} sites",
            path,
            config.profiles.len(),
            config.sites.len()
        );
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml_ng::from_str(contents)?;
        let profiles = compile_profiles(&raw.profiles)?;
        let mut sites = Vec::with_capacity(raw.sites.len());
        for raw_site in &raw.sites {
            sites.push(compile_site(&raw_site.merged_with(&raw.default), &profiles)?);
        }
        Ok(Self {
            profiles,
            sites,
            raw,
        })
    }

    pub fn lookup_site(&self, name: &str) -> Result<&Site, ConfigError> {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSite(name.to_string()))
    }

    /// Replace every profile's template for this run (the `--local-dir`
    /// override).
    pub fn override_template(&mut self, raw_template: &str) -> Result<(), ConfigError> {
        let mut replaced = IndexMap::with_capacity(self.profiles.len());
        for (name, profile) in &self.profiles {
            let template = PathTemplate::compile(raw_template).map_err(|source| {
                ConfigError::InvalidTemplate {
                    profile: name.clone(),
                    template: raw_template.to_string(),
                    source,
                }
            })?;
            replaced.insert(
                name.clone(),
                Arc::new(Profile {
                    template,
                    ..(**profile).clone()
                }),
            );
        }
        for site in &mut self.sites {
            if let Some(profile) = replaced.get(&site.profile.name) {
                site.profile = Arc::clone(profile);
            }
        }
        self.profiles = replaced;
        Ok(())
    }

    /// JSON rendering of the raw document, for the `--test` flag.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.raw)
    }
}

fn compile_profiles(
    raw: &IndexMap<String, RawProfile>,
) -> Result<IndexMap<String, Arc<Profile>>, ConfigError> {
    let mut profiles = IndexMap::with_capacity(raw.len());
    for (name, raw_profile) in raw {
        let template = PathTemplate::compile(&raw_profile.template).map_err(|source| {
            ConfigError::InvalidTemplate {
                profile: name.clone(),
                template: raw_profile.template.clone(),
                source,
            }
        })?;
        let mut replacements = Vec::with_capacity(raw_profile.replacements.len());
        for rule in &raw_profile.replacements {
            let pattern =
                Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidReplacement {
                    profile: name.clone(),
                    pattern: rule.pattern.clone(),
                    source,
                })?;
            replacements.push(Replacement {
                pattern,
                replacement: rule.replacement.clone(),
            });
        }
        profiles.insert(
            name.clone(),
            Arc::new(Profile {
                name: name.clone(),
                parser: MediaParser::new(raw_profile.parser.unwrap_or(ParserKind::Default)),
                template,
                replacements,
            }),
        );
    }
    Ok(profiles)
}

fn compile_site(
    raw: &RawSite,
    profiles: &IndexMap<String, Arc<Profile>>,
) -> Result<Site, ConfigError> {
    let name = raw.name.clone().ok_or(ConfigError::MissingField {
        site: "<unnamed>".to_string(),
        field: "name",
    })?;
    let profile_name = raw.profile.clone().ok_or(ConfigError::MissingField {
        site: name.clone(),
        field: "profile",
    })?;
    let profile = profiles
        .get(&profile_name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownProfile {
            site: name.clone(),
            profile: profile_name,
        })?;
    let max_age_secs = match &raw.max_age {
        Some(value) => {
            parser::parse_duration(value).map_err(|source| ConfigError::InvalidMaxAge {
                site: name.clone(),
                value: value.clone(),
                source,
            })?
        }
        None => 0,
    };
    Ok(Site {
        patterns: compile_patterns(&name, raw.patterns.as_deref().unwrap_or_default())?,
        filters: compile_patterns(&name, raw.filters.as_deref().unwrap_or_default())?,
        priorities: compile_patterns(&name, raw.priorities.as_deref().unwrap_or_default())?,
        dirs: raw.dirs.clone().unwrap_or_default(),
        max_age_secs,
        skip_symlinks: raw.skip_symlinks.unwrap_or(false),
        skip_files: raw.skip_files.unwrap_or(false),
        skip_existing: raw.skip_existing.unwrap_or(false),
        merge: raw.merge.unwrap_or(false),
        skip: raw.skip.unwrap_or(false),
        post_command: raw.post_command.clone().filter(|s| !s.is_empty()),
        transfer_verb: raw
            .transfer_verb
            .clone()
            .unwrap_or_else(|| "mirror".to_string()),
        profile,
        name,
    })
}

fn compile_patterns(site: &str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                site: site.to_string(),
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}
