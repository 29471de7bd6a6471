//! Queue construction pipeline.
//!
//! Raw listing → classifier → optional on-disk merge → stable sort by remote
//! path → priority-ranked deduplication → existence guard. Construction is
//! single-threaded and strictly sequential: the deduplicator compares all
//! pairs, so every item (including merged ones) must exist before the first
//! comparison. The sort fixes serialization order only; dedup itself is
//! order-independent.

mod item;

pub use item::Item;

use crate::config::{ConfigError, Site};
use crate::parser::format_duration;
use crate::transport::{DirLister, RemoteEntry, Transport};
use anyhow::Context;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::io::{BufRead, Write};
use std::process::{Command, Stdio};

/// A per-site transfer queue. Read-only once construction completes, except
/// for downstream consumption.
#[derive(Debug, Clone)]
pub struct Queue {
    pub site: Site,
    pub items: Vec<Item>,
}

impl Queue {
    /// Build a queue from a remote listing. `now` is passed explicitly so the
    /// age rule is deterministic under test.
    pub fn build(
        site: Site,
        entries: &[RemoteEntry],
        lister: &dyn DirLister,
        now: DateTime<Utc>,
    ) -> Self {
        let mut queue = Queue {
            items: Vec::with_capacity(entries.len()),
            site,
        };
        for entry in entries {
            let item = classify(&queue.site, entry, now);
            queue.items.push(item);
        }
        if queue.site.merge {
            queue.merge(lister);
        }
        queue
            .items
            .sort_by(|a, b| a.remote_path.cmp(&b.remote_path));
        if !queue.site.priorities.is_empty() {
            queue.deduplicate();
        }
        queue.guard_existing(lister);
        tracing::debug!(
            "built queue for {}: {} items, {} transferable",
            queue.site.name,
            queue.items.len(),
            queue.transferable().len()
        );
        queue
    }

    /// Import mode: build queues from externally supplied paths, one per
    /// non-blank line, optionally prefixed with a site name. Classification,
    /// merging and deduplication are bypassed; items are accepted
    /// unconditionally unless profile resolution fails. An unknown site name
    /// fails the whole call.
    pub fn read<R: BufRead>(sites: &[Site], reader: R) -> anyhow::Result<Vec<Queue>> {
        let mut queues: IndexMap<String, Queue> = IndexMap::new();
        for line in reader.lines() {
            let line = line.context("failed to read import stream")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // The first token names a site only when it matches a configured
            // one; otherwise the whole line is a path (which may contain
            // whitespace). A bare path is only unambiguous with a single
            // site.
            let (site, remote_path) = match line.split_once(char::is_whitespace) {
                Some((first, rest)) => match sites.iter().find(|s| s.name == first) {
                    Some(site) => (site, rest.trim_start()),
                    None if sites.len() == 1 => (&sites[0], line),
                    None => return Err(ConfigError::UnknownSite(first.to_string()).into()),
                },
                None if sites.len() == 1 => (&sites[0], line),
                None => return Err(ConfigError::UnresolvedImport(line.to_string()).into()),
            };
            let mut item = match site.profile.resolve(remote_path) {
                Ok((media, local_path)) => {
                    Item::new(remote_path, DateTime::UNIX_EPOCH, media, local_path)
                }
                Err(err) => {
                    Item::resolve_failed(remote_path, DateTime::UNIX_EPOCH, err.to_string())
                }
            };
            if !item.local_path.is_empty() {
                item.accept("Import=true");
            }
            queues
                .entry(site.name.clone())
                .or_insert_with(|| Queue {
                    site: site.clone(),
                    items: Vec::new(),
                })
                .items
                .push(item);
        }
        Ok(queues.into_values().collect())
    }

    /// Accepted items, in item order.
    pub fn transferable(&self) -> Vec<&Item> {
        self.items.iter().filter(|i| i.transfer).collect()
    }

    /// The transfer script consumed by the transport. Bit-exact format:
    /// paths are single-quoted with interior quotes escaped.
    pub fn to_script(&self) -> String {
        let mut script = String::from("open ");
        script.push_str(&self.site.name);
        script.push('\n');
        for item in self.transferable() {
            script.push_str("queue ");
            script.push_str(&self.site.transfer_verb);
            script.push(' ');
            script.push_str(&quote(&item.remote_path));
            script.push(' ');
            script.push_str(&quote(&item.local_path));
            script.push('\n');
        }
        script.push_str("queue start\nwait\nexit\n");
        script
    }

    /// The full item array, rejected items included, for observability.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.items)
    }

    /// Write the transfer script to a scoped temporary file and hand it to
    /// the transport. The file is removed on every exit path.
    pub fn dispatch(&self, transport: &dyn Transport) -> anyhow::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("fetchq")
            .tempfile()
            .context("failed to create transfer script")?;
        file.write_all(self.to_script().as_bytes())
            .context("failed to write transfer script")?;
        file.flush()?;
        let path = Utf8Path::from_path(file.path())
            .context("transfer script path is not valid UTF-8")?;
        transport
            .consume(path)
            .with_context(|| format!("transfer failed for {}", self.site.name))?;
        Ok(())
    }

    /// Feed the serialized item array to the configured post-command's
    /// standard input. Invoked only after a successful dispatch.
    pub fn post_process(&self, inherit_io: bool) -> anyhow::Result<()> {
        let Some(command) = &self.site.post_command else {
            return Ok(());
        };
        let json = serde_json::to_vec(&self.items).context("failed to serialize items")?;
        let mut argv = command.split_whitespace();
        let program = argv.next().context("post command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(argv).stdin(Stdio::piped());
        if !inherit_io {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        tracing::info!("running post command {:?} for {}", command, self.site.name);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to run post command {command:?}"))?;
        child
            .stdin
            .take()
            .context("post command has no stdin")?
            .write_all(&json)?;
        let status = child.wait()?;
        if !status.success() {
            anyhow::bail!(
                "post command {:?} exited with status {}",
                command,
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }

    fn merge(&mut self, lister: &dyn DirLister) {
        let mut synthetic = Vec::new();
        for item in self.items.iter().filter(|i| i.transfer) {
            synthetic.extend(item.merge_candidates(&self.site.profile, lister));
        }
        self.items.extend(synthetic);
    }

    /// Rank of an item under the site's priority patterns: pattern count
    /// minus the index of the first matching pattern, 0 when none match.
    /// Higher is preferred.
    fn rank(&self, item: &Item) -> usize {
        let base = crate::template::base_name(&item.remote_path);
        for (i, pattern) in self.site.priorities.iter().enumerate() {
            if pattern.is_match(base) {
                return self.site.priorities.len() - i;
            }
        }
        0
    }

    /// All-pairs deduplication so chains of three or more equal-media items
    /// converge on the single maximum-rank survivor. An equal-rank pair with
    /// a merged participant is left untouched: neither side outranks the
    /// other and the on-disk copy may already be authoritative.
    fn deduplicate(&mut self) {
        for i in 0..self.items.len() {
            for j in (i + 1)..self.items.len() {
                let a = &self.items[i];
                let b = &self.items[j];
                if !a.transfer || !b.transfer {
                    continue;
                }
                // Ignore self
                if a.remote_path == b.remote_path {
                    continue;
                }
                if !a.media.equal(&b.media) {
                    continue;
                }
                let rank_a = self.rank(a);
                let rank_b = self.rank(b);
                if rank_a == rank_b && (a.merged || b.merged) {
                    continue;
                }
                let (loser, winner_path, rank) = if rank_a <= rank_b {
                    (i, b.remote_path.clone(), rank_a)
                } else {
                    (j, a.remote_path.clone(), rank_b)
                };
                let item = &mut self.items[loser];
                item.duplicate = true;
                item.reject(format!("DuplicateOf={winner_path} Rank={rank}"));
            }
        }
    }

    /// Reject accepted items whose destination already holds data. Runs
    /// strictly after deduplication so merged rivals are settled first.
    fn guard_existing(&mut self, lister: &dyn DirLister) {
        if !self.site.skip_existing {
            return;
        }
        for item in self.items.iter_mut().filter(|i| i.transfer) {
            if !lister.list_dir(item.dst_dir()).is_empty() {
                item.reject("IsDstDirEmpty=false");
            }
        }
    }
}

/// Classifier: fixed rule order, first match wins. Reason strings are stable
/// and exact; they are part of the observable contract.
fn classify(site: &Site, entry: &RemoteEntry, now: DateTime<Utc>) -> Item {
    let (media, local_path) = match site.profile.resolve(&entry.path) {
        Ok(resolved) => resolved,
        Err(err) => return Item::resolve_failed(&entry.path, entry.modified, err.to_string()),
    };
    let mut item = Item::new(&entry.path, entry.modified, media, local_path);
    let age = entry.age(now);
    if entry.is_symlink() && site.skip_symlinks {
        item.reject("IsSymlink=true SkipSymlinks=true");
    } else if entry.is_file() && site.skip_files {
        item.reject("IsFile=true SkipFiles=true");
    } else if let Some(pattern) = match_any(&site.filters, entry.base_name()) {
        item.reject(format!("Filter={pattern}"));
    } else if site.max_age_secs != 0 && age > site.max_age_secs {
        item.reject(format!(
            "Age={} MaxAge={}",
            format_duration(age),
            format_duration(site.max_age_secs)
        ));
    } else if let Some(pattern) = match_any(&site.patterns, entry.base_name()) {
        item.accept(format!("Match={pattern}"));
    }
    item
}

fn match_any<'a>(patterns: &'a [Regex], base: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| p.is_match(base))
        .map(|p| p.as_str())
}

fn quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "\\'"))
}
