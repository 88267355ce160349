//! Fixed dangerous denylist
//!
//! Independent of the allowed-type table: a file hitting any of these is
//! rejected even if a misconfigured table would accept it.

use crate::signature::normalize_mime;

/// Executables, scripts and server-side code
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    // Windows executables and installers
    "exe", "com", "bat", "cmd", "scr", "pif", "msi", "msp", "dll", "cpl", "sys", "drv", "ocx",
    "hta", "lnk", "reg", "inf", "gadget", "application", "appref-ms", "msc",
    // Scripts
    "js", "jse", "mjs", "vbs", "vbe", "ws", "wsf", "wsh", "wsc", "ps1", "ps1xml", "ps2", "psm1",
    "sh", "bash", "zsh", "csh", "ksh", "command", "py", "pyc", "pyw", "pl", "rb", "lua", "tcl",
    // Server-side code
    "php", "php3", "php4", "php5", "php7", "phtml", "phar", "asp", "aspx", "asa", "ascx", "ashx",
    "asmx", "cer", "jsp", "jspx", "cfm", "cfc", "cgi", "shtml", "htaccess", "htpasswd",
    // Packages and bytecode
    "jar", "war", "ear", "class", "apk", "app", "deb", "rpm", "dmg", "pkg", "run", "bin", "elf",
    "so", "dylib", "vb", "vbscript", "svg", "html", "htm", "xhtml", "swf",
];

/// MIME types of executable or active content
pub const DANGEROUS_MIME_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-dosexec",
    "application/x-executable",
    "application/x-elf",
    "application/x-sharedlib",
    "application/x-mach-binary",
    "application/x-sh",
    "application/x-shellscript",
    "application/x-csh",
    "application/x-bat",
    "application/x-msi",
    "application/x-ms-installer",
    "application/java-archive",
    "application/x-java-archive",
    "application/vnd.android.package-archive",
    "application/x-php",
    "application/x-httpd-php",
    "text/x-php",
    "application/x-python-code",
    "text/x-python",
    "text/x-perl",
    "application/x-perl",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/ecmascript",
    "text/vbscript",
    "application/hta",
    "text/html",
    "application/xhtml+xml",
    "image/svg+xml",
    "application/x-shockwave-flash",
];

/// Web-server and runtime configuration files, matched on the whole name
pub const DANGEROUS_FILENAMES: &[&str] = &[
    ".htaccess",
    ".htpasswd",
    "web.config",
    ".user.ini",
    "php.ini",
    ".env",
    ".npmrc",
    ".bashrc",
    ".profile",
];

pub fn is_dangerous_extension(extension: &str) -> bool {
    DANGEROUS_EXTENSIONS
        .iter()
        .any(|e| e.eq_ignore_ascii_case(extension))
}

pub fn is_dangerous_mime(mime: &str) -> bool {
    let mime = normalize_mime(mime);
    DANGEROUS_MIME_TYPES.contains(&mime.as_str())
}

/// Whole-name match, ignoring case and any directory part
pub fn is_dangerous_filename(name: &str) -> bool {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    DANGEROUS_FILENAMES
        .iter()
        .any(|n| n.eq_ignore_ascii_case(base))
}
