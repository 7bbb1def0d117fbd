//! File-name based language detection.

use std::path::Path;

const DOCKERFILE_NAMES: &[&str] = &["dockerfile", "dockerfile.dev", "dockerfile.prod"];
const MAKEFILE_NAMES: &[&str] = &["makefile", "makefile.am", "makefile.in"];

/// Extension → label. Keys are lowercase and include the leading dot.
const EXTENSIONS: &[(&str, &str)] = &[
    (".py", "Python"),
    (".js", "JavaScript"),
    (".jsx", "JavaScript (React)"),
    (".ts", "TypeScript"),
    (".tsx", "TypeScript (React)"),
    (".java", "Java"),
    (".c", "C"),
    (".cpp", "C++"),
    (".cc", "C++"),
    (".cxx", "C++"),
    (".h", "C/C++ Header"),
    (".hpp", "C++ Header"),
    (".cs", "C#"),
    (".php", "PHP"),
    (".rb", "Ruby"),
    (".go", "Go"),
    (".rs", "Rust"),
    (".kt", "Kotlin"),
    (".swift", "Swift"),
    (".scala", "Scala"),
    (".sh", "Shell"),
    (".bash", "Bash"),
    (".zsh", "Zsh"),
    (".sql", "SQL"),
    (".html", "HTML"),
    (".css", "CSS"),
    (".scss", "SCSS"),
    (".sass", "Sass"),
    (".less", "Less"),
    (".xml", "XML"),
    (".json", "JSON"),
    (".yaml", "YAML"),
    (".yml", "YAML"),
    (".toml", "TOML"),
    (".ini", "INI"),
    (".cfg", "Config"),
    (".conf", "Config"),
    (".md", "Markdown"),
    (".txt", "Text"),
    (".dockerfile", "Dockerfile"),
    (".r", "R"),
    (".m", "MATLAB/Objective-C"),
    (".pl", "Perl"),
    (".lua", "Lua"),
    (".vim", "Vim Script"),
    (".dart", "Dart"),
    (".ex", "Elixir"),
    (".exs", "Elixir Script"),
];

/// Map a path to a human-readable language label, `"Unknown"` if unrecognised.
///
/// Well-known build file names (Dockerfile and Makefile variants) are
/// matched case-insensitively on the basename before the extension lookup.
pub fn detect_language(path: &str) -> &'static str {
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if DOCKERFILE_NAMES.contains(&file_name.as_str()) {
        return "Dockerfile";
    }
    if MAKEFILE_NAMES.contains(&file_name.as_str()) {
        return "Makefile";
    }

    let suffix = match Path::new(&file_name).extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => return "Unknown",
    };

    EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == suffix)
        .map(|(_, label)| *label)
        .unwrap_or("Unknown")
}
