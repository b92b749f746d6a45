//! Tag matching.
//!
//! Selection is regex based: a tag is kept when the pattern matches
//! anywhere in it, so `alpine.*` keeps `alpine:latest` but also
//! `library/alpine:3.16`.  Anchor the pattern to be stricter.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Returns the tags matching `re`, in their original order.
pub fn matching_tags(re: &Regex, tags: &[String]) -> Vec<String> {
    tags.iter().filter(|tag| re.is_match(tag)).cloned().collect()
}

fn image_line() -> &'static Regex {
    static IMAGE_LINE: OnceLock<Regex> = OnceLock::new();
    IMAGE_LINE.get_or_init(|| Regex::new(r"^[ ]*image: (.+)$").expect("image line regex"))
}

/// Collects the image references of every `image:` line of a compose file.
pub fn images_from_file(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut images = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(captures) = image_line().captures(&line) {
            let image = captures[1].trim().trim_matches(|c| c == '"' || c == '\'');
            if !image.is_empty() {
                images.push(image.to_string());
            }
        }
    }

    Ok(images)
}

/// Builds an anchored pattern matching exactly the given image references.
///
/// A reference without a tag means `:latest`, as it does for `docker pull`.
/// Returns `None` for an empty list.
pub fn pattern_for_images(images: &[String]) -> Option<String> {
    if images.is_empty() {
        return None;
    }

    let alternatives: Vec<String> = images
        .iter()
        .map(|image| regex::escape(&with_default_tag(image)))
        .collect();

    Some(format!("^(?:{})$", alternatives.join("|")))
}

fn with_default_tag(image: &str) -> String {
    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains(':') || name.contains('@') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}
