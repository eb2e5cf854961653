// ABOUTME: Extension-based mime type inference for written files
// ABOUTME: Best-effort classification, not a content-sniffing guarantee

/// Infer a mime type from a file extension. Unknown extensions map to a
/// generic binary type.
pub fn mime_for_path(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().unwrap_or_default();
    match extension {
        "js" | "mjs" | "cjs" => "text/javascript",
        "jsx" => "text/javascript",
        "ts" | "tsx" => "text/typescript",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "yml" | "yaml" => "application/yaml",
        "toml" => "application/toml",
        "sh" => "text/x-shellscript",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_for_path("package.json"), "application/json");
        assert_eq!(mime_for_path("src/main.tsx"), "text/typescript");
        assert_eq!(mime_for_path("index.html"), "text/html");
        assert_eq!(mime_for_path("styles/app.css"), "text/css");
    }

    #[test]
    fn test_unknown_extension_is_binary() {
        assert_eq!(mime_for_path("data.bin"), "application/octet-stream");
        assert_eq!(mime_for_path("Makefile"), "application/octet-stream");
    }
}
