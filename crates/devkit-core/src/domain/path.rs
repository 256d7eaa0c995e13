//! Device path grammar.
//!
//! A device path names a file or directory on the remote device's virtual
//! filesystem.  It is *not* a host path: it always uses backslash separators
//! and, when absolute, starts with one of two origin tokens:
//!
//! ```text
//! xd:\Windows\System32\notepad.exe          virtual drive (case-insensitive)
//! {Contoso.Game_8wekyb3d8bbwe}:\save.dat    package family name in braces
//! ..\logs\trace.etl                         relative fragment, no origin
//! ```
//!
//! A host drive such as `c:\` is rejected: it only has meaning on the host.
//!
//! Every function here is a pure transform over strings.  Nothing touches the
//! device, and nothing canonicalises `..` segments.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted device path, in characters.
pub const MAX_PATH_LENGTH: usize = 259;

/// The device path separator.
pub const SEPARATOR: char = '\\';

/// Forward slashes are accepted on input and rewritten to [`SEPARATOR`].
const ALT_SEPARATOR: char = '/';

/// The virtual drive token, stored lower-case.
const VIRTUAL_DRIVE: &str = "xd:";

/// Characters that may only appear inside an origin token.
const RESERVED_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Errors produced while validating or combining device paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path is empty or whitespace only.
    #[error("device path is empty")]
    Empty,

    /// The path exceeds [`MAX_PATH_LENGTH`].
    #[error("device path is {length} characters long; the limit is {MAX_PATH_LENGTH}")]
    TooLong { length: usize },

    /// A reserved or control character appears outside the origin token.
    #[error("device path {path:?} contains the reserved character {character:?}")]
    ReservedCharacter { path: String, character: char },

    /// The path starts with a host drive letter such as `c:`.
    #[error("{0:?} is a host drive path; device paths start with xd: or {{family}}:")]
    HostDrive(String),

    /// An operation needed an absolute path but got a relative fragment.
    #[error("device path {0:?} has no origin")]
    MissingOrigin(String),

    /// A relative fragment was expected but the argument is rooted.
    #[error("relative fragment {0:?} must not carry an origin")]
    UnexpectedOrigin(String),

    /// Two `DevicePath`s from different namespaces were combined.
    #[error("cannot combine a {base} path with a {relative} path")]
    ContextMismatch {
        base: PathContext,
        relative: PathContext,
    },

    /// A context name did not match any known namespace.
    #[error("unknown path context {0:?}; expected \"system\" or \"title\"")]
    UnknownContext(String),
}

/// The execution namespace a path is resolved in on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathContext {
    /// The system operating system partition.
    #[default]
    System,
    /// The title (game) operating system partition.
    Title,
}

impl fmt::Display for PathContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathContext::System => "system",
            PathContext::Title => "title",
        })
    }
}

impl FromStr for PathContext {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(PathContext::System),
            "title" => Ok(PathContext::Title),
            _ => Err(PathError::UnknownContext(s.to_string())),
        }
    }
}

/// The root token of an absolute device path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The fixed `xd:` virtual drive.
    VirtualDrive,
    /// A `{family}:` token; holds the family name without braces.
    PackageFamily(String),
}

impl Origin {
    /// Renders the token as it appears at the start of a path.
    pub fn token(&self) -> String {
        match self {
            Origin::VirtualDrive => VIRTUAL_DRIVE.to_string(),
            Origin::PackageFamily(family) => format!("{{{family}}}:"),
        }
    }

    /// Length in bytes of the rendered token.
    fn token_len(&self) -> usize {
        match self {
            Origin::VirtualDrive => VIRTUAL_DRIVE.len(),
            Origin::PackageFamily(family) => family.len() + 3,
        }
    }
}

// ── Free functions over raw strings ──────────────────────────────────────────

/// Returns `true` if `raw` is a well-formed device path or relative fragment.
///
/// ```
/// use devkit_core::domain::path::is_valid_path;
///
/// assert!(is_valid_path(r"xd:\test"));
/// assert!(is_valid_path(r"..\test\foo.txt"));
/// assert!(!is_valid_path(r"xd:<>\test"));
/// assert!(!is_valid_path(r"c:\test"));
/// ```
pub fn is_valid_path(raw: &str) -> bool {
    validate(&normalize(raw)).is_ok()
}

/// Returns `true` if `raw` is a valid path rooted at an origin token.
///
/// A relative fragment is valid but has no origin.  Anything that fails
/// [`is_valid_path`] also has no origin.
pub fn has_origin(raw: &str) -> bool {
    matches!(validate(&normalize(raw)), Ok(Some(_)))
}

/// Returns the parent portion of `raw`.
///
/// - A root (`xd:\`) returns itself.
/// - A bare origin (`xd:`) returns `None`; it is not yet a root.
/// - A path ending in a separator returns the path with the trailing
///   separator removed, i.e. the directory itself.
/// - A relative fragment without any separator returns `None`.
///
/// # Errors
///
/// Returns [`PathError`] if `raw` is not a valid device path.
pub fn directory_name(raw: &str) -> Result<Option<String>, PathError> {
    let path = normalize(raw);
    let parent = match validate(&path)? {
        Some(origin) => rooted_parent(&path, origin.token_len()),
        None => relative_parent(&path),
    };
    Ok(parent)
}

/// Returns the final component of `raw`, or an empty string for a root or a
/// path ending in a separator.
///
/// # Errors
///
/// Returns [`PathError`] if `raw` is not a valid device path.
pub fn file_name(raw: &str) -> Result<String, PathError> {
    let path = normalize(raw);
    let token_len = validate(&path)?.map_or(0, |origin| origin.token_len());
    Ok(last_component(&path[token_len..]).to_string())
}

/// Appends `relative` to the rooted path `base`.
///
/// Exactly one separator is inserted unless `base` already ends with one.
/// `..` segments are kept verbatim.
///
/// # Errors
///
/// - [`PathError::MissingOrigin`] if `base` has no origin.
/// - [`PathError::UnexpectedOrigin`] if `relative` has one.
/// - Any validation error for either argument or for the combined result.
pub fn combine(base: &str, relative: &str) -> Result<String, PathError> {
    let base = normalize(base);
    if validate(&base)?.is_none() {
        return Err(PathError::MissingOrigin(base.into_owned()));
    }
    let relative = normalize(relative);
    if relative.is_empty() {
        return Ok(base.into_owned());
    }
    append(&base, &relative)
}

/// Joins two relative fragments.
///
/// Follows the same separator rule as [`combine`], so that
/// `combine(combine(a, b), c) == combine(a, join_fragments(b, c))`.
///
/// # Errors
///
/// [`PathError::UnexpectedOrigin`] if `first` is rooted, plus any validation
/// error for the arguments or the result.
pub fn join_fragments(first: &str, second: &str) -> Result<String, PathError> {
    let first = normalize(first);
    if validate(&first)?.is_some() {
        return Err(PathError::UnexpectedOrigin(first.into_owned()));
    }
    let second = normalize(second);
    if second.is_empty() {
        return Ok(first.into_owned());
    }
    append(&first, &second)
}

fn append(base: &str, relative: &str) -> Result<String, PathError> {
    if validate(relative)?.is_some() {
        return Err(PathError::UnexpectedOrigin(relative.to_string()));
    }
    let combined = if base.ends_with(SEPARATOR) {
        format!("{base}{relative}")
    } else {
        format!("{base}{SEPARATOR}{relative}")
    };
    validate(&combined)?;
    Ok(combined)
}

// ── Grammar internals ────────────────────────────────────────────────────────

fn normalize(raw: &str) -> Cow<'_, str> {
    if raw.contains(ALT_SEPARATOR) {
        Cow::Owned(raw.replace(ALT_SEPARATOR, "\\"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Validates a normalised path and returns its origin, if any.
fn validate(path: &str) -> Result<Option<Origin>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let length = path.chars().count();
    if length > MAX_PATH_LENGTH {
        return Err(PathError::TooLong { length });
    }

    let origin = split_origin(path);
    let body = match &origin {
        Some(origin) => &path[origin.token_len()..],
        None if is_host_drive(path) => return Err(PathError::HostDrive(path.to_string())),
        None => path,
    };

    if let Some(character) = body.chars().find(|c| is_reserved(*c)) {
        return Err(PathError::ReservedCharacter {
            path: path.to_string(),
            character,
        });
    }
    Ok(origin)
}

/// Recognises an origin token followed by nothing or by a separator.
fn split_origin(path: &str) -> Option<Origin> {
    let origin = if path
        .get(..VIRTUAL_DRIVE.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(VIRTUAL_DRIVE))
    {
        Origin::VirtualDrive
    } else {
        let body = path.strip_prefix('{')?;
        let close = body.find('}')?;
        let family = &body[..close];
        if family.is_empty() || !body[close + 1..].starts_with(':') {
            return None;
        }
        Origin::PackageFamily(family.to_string())
    };

    let rest = &path[origin.token_len()..];
    (rest.is_empty() || rest.starts_with(SEPARATOR)).then_some(origin)
}

fn is_host_drive(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

fn is_reserved(c: char) -> bool {
    RESERVED_CHARS.contains(&c) || c.is_control()
}

fn rooted_parent(path: &str, token_len: usize) -> Option<String> {
    let (token, rest) = path.split_at(token_len);
    if rest.is_empty() {
        return None;
    }

    let trimmed = rest.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        // Root: idempotent when already in canonical `token\` form.
        return Some(if rest.len() == 1 {
            path.to_string()
        } else {
            format!("{token}{SEPARATOR}")
        });
    }
    if trimmed.len() < rest.len() {
        return Some(format!("{token}{trimmed}"));
    }

    match trimmed.rfind(SEPARATOR) {
        Some(0) => Some(format!("{token}{SEPARATOR}")),
        Some(idx) => Some(format!("{token}{}", &trimmed[..idx])),
        None => None,
    }
}

fn relative_parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() < path.len() {
        return Some(trimmed.to_string());
    }

    match trimmed.rfind(SEPARATOR) {
        Some(0) => Some(SEPARATOR.to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

fn last_component(body: &str) -> &str {
    body.rsplit(SEPARATOR).next().unwrap_or("")
}

// ── DevicePath ───────────────────────────────────────────────────────────────

/// A validated device path tagged with the namespace it resolves in.
///
/// Parsed once, immutable afterwards.  The stored string never contains a
/// forward slash, and a virtual drive token is always stored as `xd:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePath {
    raw: String,
    origin: Option<Origin>,
    context: PathContext,
}

impl DevicePath {
    /// Parses and validates `raw` in the given namespace.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if `raw` is not a valid device path.
    pub fn parse(raw: &str, context: PathContext) -> Result<Self, PathError> {
        let normalized = normalize(raw);
        let origin = validate(&normalized)?;
        let raw = match origin {
            Some(Origin::VirtualDrive) => {
                format!("{VIRTUAL_DRIVE}{}", &normalized[VIRTUAL_DRIVE.len()..])
            }
            _ => normalized.into_owned(),
        };
        Ok(Self {
            raw,
            origin,
            context,
        })
    }

    /// The normalised path string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn context(&self) -> PathContext {
        self.context
    }

    pub fn has_origin(&self) -> bool {
        self.origin.is_some()
    }

    /// Returns `true` if the path is exactly an origin followed by one separator.
    pub fn is_root(&self) -> bool {
        self.origin
            .as_ref()
            .is_some_and(|origin| &self.raw[origin.token_len()..] == "\\")
    }

    /// The final component; empty for a root or a trailing separator.
    pub fn file_name(&self) -> &str {
        let token_len = self.origin.as_ref().map_or(0, Origin::token_len);
        last_component(&self.raw[token_len..])
    }

    /// [`directory_name`] lifted to `DevicePath`, keeping the context.
    pub fn parent(&self) -> Option<DevicePath> {
        let parent = directory_name(&self.raw).ok().flatten()?;
        DevicePath::parse(&parent, self.context).ok()
    }

    /// Appends a relative string fragment in this path's context.
    ///
    /// # Errors
    ///
    /// See [`combine`].
    pub fn join(&self, relative: &str) -> Result<DevicePath, PathError> {
        let combined = combine(&self.raw, relative)?;
        DevicePath::parse(&combined, self.context)
    }

    /// Appends a relative `DevicePath`.
    ///
    /// Both operands must carry the same [`PathContext`].
    ///
    /// # Errors
    ///
    /// [`PathError::ContextMismatch`] when the contexts differ, otherwise as
    /// for [`combine`].
    pub fn combine(&self, relative: &DevicePath) -> Result<DevicePath, PathError> {
        if self.context != relative.context {
            return Err(PathError::ContextMismatch {
                base: self.context,
                relative: relative.context,
            });
        }
        self.join(&relative.raw)
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── is_valid_path ─────────────────────────────────────────────────────────

    #[test]
    fn test_is_valid_path_accepts_virtual_drive_paths() {
        assert!(is_valid_path("xd:"));
        assert!(is_valid_path(r"xd:\"));
        assert!(is_valid_path(r"XD:\Windows\notepad.exe"));
    }

    #[test]
    fn test_is_valid_path_accepts_relative_fragments() {
        assert!(is_valid_path("test"));
        assert!(is_valid_path(r"..\test\foo.txt"));
    }

    #[test]
    fn test_is_valid_path_rejects_reserved_characters_after_origin() {
        assert!(!is_valid_path(r"xd:<>\test"));
        assert!(!is_valid_path(r"xd:\te?st"));
        assert!(!is_valid_path(r"xd:\a|b"));
        assert!(!is_valid_path("xd:\\quote\"d"));
    }

    #[test]
    fn test_is_valid_path_rejects_empty_and_whitespace() {
        assert!(!is_valid_path(""));
        assert!(!is_valid_path("   "));
    }

    #[test]
    fn test_is_valid_path_rejects_host_drive() {
        assert!(!is_valid_path(r"c:\test"));
        assert!(!is_valid_path("c:"));
    }

    #[test]
    fn test_is_valid_path_enforces_length_limit() {
        // Arrange: "xd:\" is 4 characters
        let at_limit = format!(r"xd:\{}", "a".repeat(MAX_PATH_LENGTH - 4));
        let over_limit = format!(r"xd:\{}", "a".repeat(MAX_PATH_LENGTH - 3));

        // Assert
        assert!(is_valid_path(&at_limit));
        assert!(!is_valid_path(&over_limit));
    }

    #[test]
    fn test_is_valid_path_rejects_control_characters() {
        assert!(!is_valid_path("xd:\\bad\u{0007}name"));
    }

    #[test]
    fn test_validate_reports_offending_character() {
        let err = validate(r"xd:\a*b").unwrap_err();
        assert_eq!(
            err,
            PathError::ReservedCharacter {
                path: r"xd:\a*b".to_string(),
                character: '*'
            }
        );
    }

    // ── has_origin ────────────────────────────────────────────────────────────

    #[test]
    fn test_has_origin_virtual_drive_is_case_insensitive() {
        assert!(has_origin("xd:"));
        assert!(has_origin(r"Xd:\dir"));
        assert!(has_origin(r"XD:\dir\file.txt"));
    }

    #[test]
    fn test_has_origin_package_family_token() {
        assert!(has_origin("{Contoso.Game_8wekyb3d8bbwe}:"));
        assert!(has_origin(r"{Contoso.Game_8wekyb3d8bbwe}:\save.dat"));
    }

    #[test]
    fn test_has_origin_rejects_malformed_brackets() {
        assert!(!has_origin(r"{Contoso.Game]:\save.dat"));
        assert!(!has_origin(r"{Contoso.Game}\save.dat"));
        assert!(!has_origin(r"{}:\save.dat"));
    }

    #[test]
    fn test_has_origin_requires_separator_after_token() {
        assert!(!has_origin("xd:dir"));
        assert!(!has_origin("{family}:dir"));
    }

    #[test]
    fn test_has_origin_false_for_relative_fragment() {
        assert!(!has_origin(r"..\test"));
        assert!(!has_origin(""));
    }

    #[test]
    fn test_has_origin_accepts_forward_slashes() {
        assert!(has_origin("xd:/dir/file.txt"));
    }

    // ── directory_name ────────────────────────────────────────────────────────

    #[test]
    fn test_directory_name_walks_back_one_component() {
        assert_eq!(
            directory_name(r"xd:\parentDirectory\directory").unwrap(),
            Some(r"xd:\parentDirectory".to_string())
        );
    }

    #[test]
    fn test_directory_name_of_root_is_itself() {
        assert_eq!(directory_name(r"xd:\").unwrap(), Some(r"xd:\".to_string()));
        assert_eq!(
            directory_name(r"{family}:\").unwrap(),
            Some(r"{family}:\".to_string())
        );
    }

    #[test]
    fn test_directory_name_of_bare_origin_is_none() {
        assert_eq!(directory_name("xd:").unwrap(), None);
        assert_eq!(directory_name("{family}:").unwrap(), None);
    }

    #[test]
    fn test_directory_name_strips_trailing_separator_only() {
        assert_eq!(
            directory_name(r"xd:\parentDirectory\directory\").unwrap(),
            Some(r"xd:\parentDirectory\directory".to_string())
        );
    }

    #[test]
    fn test_directory_name_of_top_level_entry_is_root() {
        assert_eq!(directory_name(r"xd:\file.txt").unwrap(), Some(r"xd:\".to_string()));
    }

    #[test]
    fn test_directory_name_of_relative_fragments() {
        assert_eq!(directory_name(r"a\b").unwrap(), Some("a".to_string()));
        assert_eq!(directory_name("a").unwrap(), None);
    }

    #[test]
    fn test_directory_name_rejects_invalid_path() {
        assert!(matches!(
            directory_name(r"c:\dir"),
            Err(PathError::HostDrive(_))
        ));
    }

    // ── file_name ─────────────────────────────────────────────────────────────

    #[test]
    fn test_file_name_returns_last_component() {
        assert_eq!(file_name(r"xd:\dir\save.dat").unwrap(), "save.dat");
        assert_eq!(file_name(r"xd:\").unwrap(), "");
        assert_eq!(file_name("xd:").unwrap(), "");
        assert_eq!(file_name("loose.txt").unwrap(), "loose.txt");
    }

    // ── combine ───────────────────────────────────────────────────────────────

    #[test]
    fn test_combine_inserts_single_separator() {
        assert_eq!(combine(r"xd:\directory", "file.txt").unwrap(), r"xd:\directory\file.txt");
        assert_eq!(combine(r"xd:\directory\", "file.txt").unwrap(), r"xd:\directory\file.txt");
        assert_eq!(combine("xd:", "file.txt").unwrap(), r"xd:\file.txt");
    }

    #[test]
    fn test_combine_keeps_parent_segments_verbatim() {
        assert_eq!(
            combine(r"xd:\directory", r"..\subdirectory").unwrap(),
            r"xd:\directory\..\subdirectory"
        );
    }

    #[test]
    fn test_combine_requires_origin_on_base() {
        assert_eq!(
            combine("directory", "file.txt"),
            Err(PathError::MissingOrigin("directory".to_string()))
        );
    }

    #[test]
    fn test_combine_rejects_rooted_relative() {
        assert!(matches!(
            combine(r"xd:\directory", r"xd:\other"),
            Err(PathError::UnexpectedOrigin(_))
        ));
    }

    #[test]
    fn test_combine_rejects_result_over_length_limit() {
        let base = format!(r"xd:\{}", "a".repeat(200));
        let relative = "b".repeat(100);
        assert!(matches!(
            combine(&base, &relative),
            Err(PathError::TooLong { .. })
        ));
    }

    // ── DevicePath ────────────────────────────────────────────────────────────

    #[test]
    fn test_device_path_parse_normalises_separators_and_drive_case() {
        let path = DevicePath::parse("XD:/games/save.dat", PathContext::Title).unwrap();
        assert_eq!(path.as_str(), r"xd:\games\save.dat");
        assert_eq!(path.origin(), Some(&Origin::VirtualDrive));
        assert_eq!(path.context(), PathContext::Title);
    }

    #[test]
    fn test_device_path_exposes_package_family() {
        let path = DevicePath::parse(r"{Contoso.Game_1}:\save.dat", PathContext::Title).unwrap();
        assert_eq!(
            path.origin(),
            Some(&Origin::PackageFamily("Contoso.Game_1".to_string()))
        );
        assert_eq!(path.file_name(), "save.dat");
    }

    #[test]
    fn test_device_path_is_root() {
        let root = DevicePath::parse(r"xd:\", PathContext::System).unwrap();
        let bare = DevicePath::parse("xd:", PathContext::System).unwrap();
        let nested = DevicePath::parse(r"xd:\dir", PathContext::System).unwrap();
        assert!(root.is_root());
        assert!(!bare.is_root());
        assert!(!nested.is_root());
    }

    #[test]
    fn test_device_path_parent_preserves_context() {
        let path = DevicePath::parse(r"xd:\a\b", PathContext::Title).unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.as_str(), r"xd:\a");
        assert_eq!(parent.context(), PathContext::Title);
    }

    #[test]
    fn test_device_path_combine_requires_same_context() {
        let base = DevicePath::parse(r"xd:\dir", PathContext::System).unwrap();
        let relative = DevicePath::parse("file.txt", PathContext::Title).unwrap();
        assert_eq!(
            base.combine(&relative),
            Err(PathError::ContextMismatch {
                base: PathContext::System,
                relative: PathContext::Title
            })
        );
    }

    #[test]
    fn test_device_path_combine_same_context_succeeds() {
        let base = DevicePath::parse(r"xd:\dir", PathContext::Title).unwrap();
        let relative = DevicePath::parse("file.txt", PathContext::Title).unwrap();
        assert_eq!(base.combine(&relative).unwrap().as_str(), r"xd:\dir\file.txt");
    }

    #[test]
    fn test_path_context_from_str_is_case_insensitive() {
        assert_eq!("Title".parse::<PathContext>().unwrap(), PathContext::Title);
        assert_eq!("SYSTEM".parse::<PathContext>().unwrap(), PathContext::System);
        assert!("host".parse::<PathContext>().is_err());
    }
}
