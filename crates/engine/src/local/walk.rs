use super::SkippedFile;
use super::error::{ErrorKind, Result};
use cloudsync_config::StorageTarget;
use exn::ResultExt;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use time::OffsetDateTime;

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// A matched file that still needs hashing.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub path: PathBuf,
    /// `/`-separated path relative to the walk root.
    pub relative: String,
    pub size: u64,
    pub modified: OffsetDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct Walked {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<SkippedFile>,
}

/// Compiled source patterns.
///
/// A path is selected when it matches at least one include pattern and no
/// `!`-prefixed exclude pattern. `*` never crosses a `/`; use `**` for that.
#[derive(Debug)]
pub(crate) struct Selection {
    include: GlobSet,
    exclude: GlobSet,
    /// Literal leading directories of the include patterns, used to prune the
    /// walk.
    bases: Vec<PathBuf>,
}

impl Selection {
    pub(crate) fn compile(patterns: &[String], root: &Path) -> Result<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut bases = Vec::new();
        for pattern in patterns {
            let trimmed = pattern.trim();
            let (negated, body) = match trimmed.strip_prefix('!') {
                Some(body) => (true, body),
                None => (false, trimmed),
            };
            let expanded = match normalize(body) {
                "" => exn::bail!(ErrorKind::Pattern(pattern.clone())),
                "." => "**".to_string(),
                body if root.join(body).is_dir() => format!("{body}/**"),
                body => body.to_string(),
            };
            let glob = GlobBuilder::new(&expanded)
                .literal_separator(true)
                .build()
                .or_raise(|| ErrorKind::Pattern(pattern.clone()))?;
            match negated {
                true => {
                    exclude.add(glob);
                },
                false => {
                    bases.push(literal_base(&expanded));
                    include.add(glob);
                },
            }
        }
        Ok(Self {
            include: include.build().or_raise(|| ErrorKind::Pattern(patterns.join(", ")))?,
            exclude: exclude.build().or_raise(|| ErrorKind::Pattern(patterns.join(", ")))?,
            bases,
        })
    }

    pub(crate) fn matches(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }
}

fn normalize(pattern: &str) -> &str {
    let mut pattern = pattern.trim_end_matches('/');
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern
}

fn literal_base(glob: &str) -> PathBuf {
    glob.split('/').take_while(|segment| !segment.contains(GLOB_META)).collect()
}

/// Whether a directory can hold anything an include pattern selects.
fn may_contain(bases: &[PathBuf], directory: &Path) -> bool {
    bases.iter().any(|base| base.as_os_str().is_empty() || directory.starts_with(base) || base.starts_with(directory))
}

/// Whether the walk should enter (or yield) the entry at `relative`.
///
/// Dot-entries are only admitted when an include pattern names them
/// literally, e.g. `.well-known` or `.well-known/*.json`; wildcards never
/// reach into them.
fn admits(bases: &[PathBuf], relative: &Path, is_dir: bool) -> bool {
    let hidden = relative.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.starts_with('.'));
    if hidden {
        return bases.iter().any(|base| base.starts_with(relative));
    }
    !is_dir || may_contain(bases, relative)
}

/// Path the walker was looking at when it failed, if it says.
fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Partial(errors) => errors.iter().find_map(error_path),
        _ => None,
    }
}

/// Walk `root`, returning every selected file in path order.
///
/// Blocking; run it on the blocking pool.
pub(crate) fn walk(target: &StorageTarget, root: &Path) -> Result<Walked> {
    let selection = Selection::compile(&target.source_patterns, root)?;
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .git_ignore(target.gitignore)
        .require_git(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b));
    for name in &target.ignore_files {
        builder.add_custom_ignore_filename(name);
    }
    let bases = selection.bases.clone();
    let walk_root = root.to_path_buf();
    builder.filter_entry(move |entry| {
        let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
        match entry.path().strip_prefix(&walk_root) {
            Ok(relative) => relative.as_os_str().is_empty() || admits(&bases, relative, is_dir),
            Err(_) => true,
        }
    });

    let mut walked = Walked::default();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                let path = error_path(&err).unwrap_or_else(|| root.to_path_buf());
                tracing::warn!(bucket = %target.name, path = %path.display(), error = %err, "Skipping unreadable entry");
                walked.skipped.push(SkippedFile::new(path, err.to_string()));
                continue;
            },
        };
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(relative) = relative.to_str().map(|r| r.replace(MAIN_SEPARATOR, "/")) else {
            tracing::warn!(bucket = %target.name, path = %entry.path().display(), "Skipping non-UTF-8 path");
            walked.skipped.push(SkippedFile::new(entry.path(), "path is not valid UTF-8"));
            continue;
        };
        if !selection.matches(&relative) {
            continue;
        }
        let metadata = entry.metadata().or_raise(|| ErrorKind::Stat(entry.path().to_path_buf()))?;
        walked.candidates.push(Candidate {
            size: metadata.len(),
            modified: metadata.modified().map(OffsetDateTime::from).unwrap_or(OffsetDateTime::UNIX_EPOCH),
            path: entry.into_path(),
            relative,
        });
    }
    Ok(walked)
}
