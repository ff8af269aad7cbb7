//! Slug derivation and collision-safe file naming

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[a-z0-9#]+;").expect("valid regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s.\-/\u{2013}\u{2014}\u{a0}]+").expect("valid regex"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 _\-]").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

fn transliterate(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' | 'ĺ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' | 'ŕ' => "r",
        'ß' => "ss",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'þ' => "th",
        _ => return None,
    })
}

/// Derive a URL-safe slug from a title
///
/// Markup is stripped, accented Latin letters are folded to ASCII, and
/// whitespace, dots and dashes become single hyphens. Any other character
/// outside `[a-z0-9_-]` is dropped. The result may be empty.
///
/// # Examples
/// ```
/// use slugshot::slug::sanitize_title;
/// assert_eq!(sanitize_title("Olá, Mundo!"), "ola-mundo");
/// assert_eq!(sanitize_title("photo.JPG"), "photo-jpg");
/// ```
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let stripped = TAGS.replace_all(title, "");
    let lowered = stripped.to_lowercase();
    let without_entities = ENTITIES.replace_all(&lowered, "");

    let mut folded = String::with_capacity(without_entities.len());
    for c in without_entities.chars() {
        match transliterate(c) {
            Some(ascii) => folded.push_str(ascii),
            None => folded.push(c),
        }
    }

    let spaced = SEPARATORS.replace_all(&folded, " ");
    let allowed = DISALLOWED.replace_all(&spaced, "");
    let dashed = allowed.trim().replace(' ', "-");
    DASHES
        .replace_all(&dashed, "-")
        .trim_matches('-')
        .to_string()
}

/// Split a file name into stem and lower-cased extension
///
/// Returns `None` for the extension when the name has none.
#[must_use]
pub fn split_extension(filename: &str) -> (&str, Option<String>) {
    match Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => (
            &filename[..filename.len() - ext.len() - 1],
            Some(ext.to_lowercase()),
        ),
        None => (filename, None),
    }
}

/// Pick a file name in `dir` that does not collide with another file
///
/// Starts from `filename` and appends `-1`, `-2`, ... before the extension
/// while the candidate is taken. The file named `current` (the one about to
/// be renamed) never counts as a collision, so a file that already carries
/// the wanted name resolves to itself.
#[must_use]
pub fn unique_filename(dir: &Path, filename: &str, current: Option<&str>) -> String {
    let (stem, ext) = split_extension(filename);
    let mut candidate = filename.to_string();
    let mut suffix = 1u32;

    while current != Some(candidate.as_str()) && dir.join(&candidate).exists() {
        candidate = match ext {
            Some(ref ext) => format!("{stem}-{suffix}.{ext}"),
            None => format!("{stem}-{suffix}"),
        };
        suffix += 1;
    }

    candidate
}
