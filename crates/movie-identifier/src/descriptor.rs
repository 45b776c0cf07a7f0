//! Infer a [`FileDescriptor`] from a video file path.
//!
//! Release names look like `The.Matrix.1999.1080p.BluRay.x264.mkv`; the title
//! is everything before the year or the first release tag.

use once_cell::sync::Lazy;
use regex::Regex;
use shared::FileDescriptor;
use std::path::Path;

static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"tt\d{7,8}").expect("valid regex"));

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid regex"));

static RELEASE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s\-\[(])(?:2160p|1080p|720p|576p|480p|4k|uhd|bluray|blu-ray|brrip|bdrip|dvdrip|dvdscr|webrip|web-dl|webdl|hdtv|hdrip|x264|x265|h264|h265|hevc|xvid|divx|remux|proper|extended|unrated|imdb|tt\d{7,8})(?:$|[\s\-\])])",
    )
    .expect("valid regex")
});

/// Build the descriptor for one video file.
pub fn infer(path: impl AsRef<Path>) -> FileDescriptor {
    let path = path.as_ref();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let external_id = IMDB_ID
        .find(&path.to_string_lossy())
        .map(|m| m.as_str().to_string());

    let (title, stem_year) = split_name(&stem);
    let (parent_folder, folder_year) = split_name(&folder);

    FileDescriptor {
        path: path.to_path_buf(),
        external_id,
        title,
        year: stem_year.or(folder_year),
        parent_folder,
    }
}

/// Clean a release name into (title, year).
fn split_name(raw: &str) -> (String, Option<i32>) {
    let name = raw.replace(['.', '_'], " ");

    let year_match = YEAR
        .captures_iter(&name)
        .filter_map(|c| c.get(1))
        .last();
    let year = year_match.and_then(|m| m.as_str().parse::<i32>().ok());

    let mut cut = name.len();
    if let Some(m) = year_match {
        // A name that starts with its year ("2012") keeps it as the title
        if m.start() > 0 {
            cut = m.start();
        }
    }
    if let Some(tag) = RELEASE_TAG.find(&name) {
        if tag.start() > 0 {
            cut = cut.min(tag.start());
        }
    }

    (clean(&name[..cut]), year)
}

fn clean(name: &str) -> String {
    let stripped: String = name
        .chars()
        .map(|c| if "()[]{}".contains(c) { ' ' } else { c })
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}
