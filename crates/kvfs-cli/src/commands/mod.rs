pub mod cat;
pub mod init;
pub mod ls;
pub mod mkdir;
#[cfg(feature = "fuse")]
pub mod mount;
pub mod rm;
pub mod rmdir;
pub mod stat;
pub mod touch;
pub mod truncate;
pub mod write;

use kvfs_core::FileKind;

/// Normalize a filesystem path to ensure it starts with `/`.
/// This makes paths like `test.txt` work the same as `/test.txt`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Parses octal permission bits such as `755` or `0o644`.
pub fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{s}': {e}"))?;
    if mode > 0o7777 {
        return Err(format!("mode '{s}' out of range"));
    }
    Ok(mode)
}

/// Renders type and permission bits the way `ls -l` does.
pub fn format_mode(kind: FileKind, perm: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(match kind {
        FileKind::Directory => 'd',
        FileKind::RegularFile => '-',
    });
    for shift in [6, 3, 0] {
        let bits = (perm >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
