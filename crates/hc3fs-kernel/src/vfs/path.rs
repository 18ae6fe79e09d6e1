//! Virtual paths, namespaces, and the naming rules of the tree.
//!
//! Layout:
//!
//! ```text
//! /QuickApps/{id}_{name}/{file}.lua      one per remote script
//! /QuickApps/{id}_{name}/.rsrc.json      remote record (read-only)
//! /QuickApps/{id}_{name}/.run.lua        run manifest (read-only)
//! /Scenes/{id}_{name}/.rsrc.json
//! /Scenes/{id}_{name}/conditions.lua     script scenes
//! /Scenes/{id}_{name}/actions.lua
//! /Scenes/{id}_{name}/block.json         block scenes (read-only)
//! ```

use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use strum::EnumString;

use super::error::{VfsError, VfsResult};

/// Remote record of an object.
pub const RSRC_FILE: &str = ".rsrc.json";
/// QuickApp run manifest.
pub const RUN_FILE: &str = ".run.lua";
/// Block scene body.
pub const BLOCK_FILE: &str = "block.json";
pub const CONDITIONS_FILE: &str = "conditions.lua";
pub const ACTIONS_FILE: &str = "actions.lua";

/// Extension every QuickApp script carries in the tree.
pub const SCRIPT_EXT: &str = ".lua";

/// Prefix of placeholder file content.
pub const FILE_MARK: &str = "&%#!HC3F";

static SENTINEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"QAFILE (\d+) (.+)").expect("sentinel pattern is valid")
});

static SCRIPT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]{3,})\.lua$").expect("script name pattern is valid")
});

/// Top-level directory, selecting a resolver chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString)]
pub enum Namespace {
    #[strum(serialize = "QuickApps", serialize = "QuickApp")]
    QuickApps,
    #[strum(serialize = "Scenes", serialize = "Scene")]
    Scenes,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::QuickApps, Namespace::Scenes];

    /// Parse a top-level segment, accepting the singular spellings.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Canonical directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::QuickApps => "QuickApps",
            Namespace::Scenes => "Scenes",
        }
    }

    pub fn path(&self) -> VirtualPath {
        VirtualPath {
            segments: vec![self.as_str().to_string()],
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized, `/`-rooted path in the virtual tree.
///
/// Empty and `.` segments are dropped and a namespace alias is rewritten to
/// its canonical name, so equal trees give equal paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> VfsResult<Self> {
        let mut segments = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return Err(VfsError::invalid_path(raw)),
                _ if seg.contains('\\') || seg.contains('\0') => {
                    return Err(VfsError::invalid_path(raw));
                }
                _ => segments.push(seg.to_string()),
            }
        }
        if let Some(ns) = segments.first().and_then(|s| Namespace::from_str(s)) {
            segments[0] = ns.as_str().to_string();
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn namespace(&self) -> Option<Namespace> {
        self.segments.first().and_then(|s| Namespace::from_str(s))
    }

    /// True if the top-level segment is hidden (`.` prefixed).
    pub fn is_reserved(&self) -> bool {
        self.segments.first().is_some_and(|s| s.starts_with('.'))
    }

    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(self.prefix(self.depth() - 1))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Append one segment. `name` must not contain a separator.
    pub fn join(&self, name: &str) -> VirtualPath {
        debug_assert!(is_segment(name), "not a single path segment: {name:?}");
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// The first `depth` segments.
    pub fn prefix(&self, depth: usize) -> VirtualPath {
        Self {
            segments: self.segments[..depth.min(self.depth())].to_vec(),
        }
    }

    pub fn starts_with(&self, other: &VirtualPath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// The object directory (depth 2) this path lives in, if any.
    pub fn object_dir(&self) -> Option<VirtualPath> {
        (self.depth() >= 2).then(|| self.prefix(2))
    }

    /// Object id parsed from the object directory segment.
    pub fn object_id(&self) -> Option<u64> {
        self.segments.get(1).and_then(|s| parse_object_id(s))
    }

    /// Location relative to the shadow root.
    pub fn to_relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for VirtualPath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Directory name of a remote object. Spaces, separators and NUL become `_`;
/// the id prefix keeps the result from ever being `.` or `..`.
pub fn object_dir_name(id: u64, name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if matches!(c, ' ' | '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    format!("{id}_{name}")
}

/// True if `name` is usable as exactly one tree segment.
pub fn is_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Leading decimal run of an object directory segment.
pub fn parse_object_id(segment: &str) -> Option<u64> {
    let end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    segment[..end].parse().ok()
}

/// Placeholder content for a QuickApp script that has not been fetched.
pub fn sentinel(id: u64, name: &str) -> String {
    format!("{FILE_MARK} QAFILE {id} {name}")
}

/// Decode a placeholder back into `(id, remote file name)`.
pub fn parse_sentinel(content: &[u8]) -> Option<(u64, String)> {
    let text = std::str::from_utf8(content).ok()?;
    if !text.starts_with(FILE_MARK) {
        return None;
    }
    let caps = SENTINEL_RE.captures(text)?;
    let id = caps.get(1)?.as_str().parse().ok()?;
    Some((id, caps.get(2)?.as_str().to_string()))
}

/// Validate a QuickApp script file name and return its remote name (stem).
pub fn check_script_name(name: &str) -> VfsResult<&str> {
    SCRIPT_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            VfsError::permission_denied(format!(
                "{name}: script names are [A-Za-z0-9_]{{3,}}{SCRIPT_EXT}"
            ))
        })
}

/// Tree name of a remote QuickApp file.
pub fn script_file_name(remote: &str) -> String {
    format!("{remote}{SCRIPT_EXT}")
}

/// Remote name of a tree file, if it is a script.
pub fn remote_file_name(name: &str) -> Option<&str> {
    name.strip_suffix(SCRIPT_EXT)
}

/// Files the resolvers generate and the provider never writes.
pub fn is_generated(ns: Namespace, name: &str) -> bool {
    match ns {
        Namespace::QuickApps => name == RSRC_FILE || name == RUN_FILE,
        Namespace::Scenes => name == RSRC_FILE || name == BLOCK_FILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_aliases() {
        assert_eq!(Namespace::from_str("QuickApps"), Some(Namespace::QuickApps));
        assert_eq!(Namespace::from_str("QuickApp"), Some(Namespace::QuickApps));
        assert_eq!(Namespace::from_str("Scene"), Some(Namespace::Scenes));
        assert_eq!(Namespace::from_str("Devices"), None);
        assert_eq!(Namespace::Scenes.to_string(), "Scenes");
    }

    #[test]
    fn test_parse_normalizes() {
        let p = VirtualPath::parse("//QuickApp/./12_Lamp/main.lua").unwrap();
        assert_eq!(p.to_string(), "/QuickApps/12_Lamp/main.lua");
        assert_eq!(p.depth(), 3);
        assert_eq!(p.namespace(), Some(Namespace::QuickApps));
        assert_eq!(p.object_id(), Some(12));
        assert_eq!(p.file_name(), Some("main.lua"));
        assert_eq!(p.parent().unwrap().to_string(), "/QuickApps/12_Lamp");
        assert_eq!(p.object_dir().unwrap().to_string(), "/QuickApps/12_Lamp");

        assert!(VirtualPath::parse("/").unwrap().is_root());
        assert_eq!(VirtualPath::root().to_string(), "/");
        assert!(VirtualPath::root().parent().is_none());
    }

    #[test]
    fn test_parse_rejects_parent_segments() {
        assert!(matches!(
            VirtualPath::parse("/QuickApps/../etc"),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_reserved_prefix() {
        assert!(VirtualPath::parse("/.vscode/settings.json").unwrap().is_reserved());
        assert!(!VirtualPath::parse("/QuickApps/12_Lamp/.rsrc.json").unwrap().is_reserved());
    }

    #[test]
    fn test_object_naming() {
        assert_eq!(object_dir_name(12, "Living room lamp"), "12_Living_room_lamp");
        assert_eq!(parse_object_id("12_Living_room_lamp"), Some(12));
        assert_eq!(parse_object_id("Lamp"), None);
    }

    #[test]
    fn test_object_name_separators() {
        assert_eq!(object_dir_name(12, "Kitchen/Lamp"), "12_Kitchen_Lamp");
        assert_eq!(object_dir_name(13, "a/../../x"), "13_a_.._.._x");
        assert_eq!(object_dir_name(14, r"C:\lamp"), "14_C:_lamp");
        assert_eq!(object_dir_name(15, ".."), "15_..");
        for name in ["12_Kitchen_Lamp", "13_a_.._.._x", "15_.."] {
            assert!(is_segment(name), "{name}");
        }
        assert!(!is_segment(".."));
        assert!(!is_segment("a/b"));
        assert!(!is_segment(""));
    }

    #[test]
    fn test_sentinel() {
        let s = sentinel(12, "utils");
        assert_eq!(s, "&%#!HC3F QAFILE 12 utils");
        assert_eq!(parse_sentinel(s.as_bytes()), Some((12, "utils".to_string())));
        assert_eq!(parse_sentinel(b"print('QAFILE 1 x')"), None);
    }

    #[test]
    fn test_script_names() {
        assert_eq!(check_script_name("utils.lua").unwrap(), "utils");
        assert_eq!(check_script_name("my_lib2.lua").unwrap(), "my_lib2");
        assert!(check_script_name("ab.lua").is_err());
        assert!(check_script_name("my-lib.lua").is_err());
        assert!(check_script_name("utils.txt").is_err());
        assert!(matches!(
            check_script_name("x.lua"),
            Err(VfsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_generated_files() {
        assert!(is_generated(Namespace::QuickApps, RUN_FILE));
        assert!(is_generated(Namespace::Scenes, BLOCK_FILE));
        assert!(!is_generated(Namespace::QuickApps, "main.lua"));
    }
}
