//! Read-only inspection of an entry's directory and dependency installs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

const PREVIEW_CHARS: usize = 1000;

const DOCUMENTATION_FILES: &[&str] = &[
    "README.md",
    "README.txt",
    "CHANGELOG.md",
    "CONTRIBUTING.md",
    "docs/index.md",
];
const CONFIGURATION_FILES: &[&str] = &[
    "config.yaml",
    "config.yml",
    "settings.ini",
    ".env.example",
    "pyproject.toml",
    "setup.py",
];
const DEPENDENCY_FILES: &[&str] = &[
    "requirements.txt",
    "Pipfile",
    "poetry.lock",
    "package.json",
];

/// Known project file with a short preview.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// First characters of the file when it is valid UTF-8.
    pub preview: Option<String>,
}

/// Known files in an entry directory, grouped by purpose.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectFiles {
    pub documentation: Vec<ProjectFile>,
    pub configuration: Vec<ProjectFile>,
    pub dependencies: Vec<ProjectFile>,
}

/// Outcome of running the dependency installer.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub success: bool,
    pub output: Vec<String>,
}

/// Reads requirement lines from a manifest, skipping blanks and comments.
///
/// Returns `Ok(None)` when the manifest does not exist.
pub fn read_dependencies(dir: &Path, manifest: &str) -> io::Result<Option<Vec<String>>> {
    let path = dir.join(manifest);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect(),
    ))
}

/// Runs `<installer> <args..> <manifest>` in `dir`, collecting output lines.
pub fn install_dependencies(
    dir: &Path,
    installer: &Path,
    args: &[String],
    manifest: &str,
) -> io::Result<InstallReport> {
    let mut child = Command::new(installer)
        .args(args)
        .arg(dir.join(manifest))
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to run {}: {e}", installer.display()),
            )
        })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    let output: Vec<String> = rx.into_iter().collect();
    for reader in readers {
        let _ = reader.join();
    }
    let status = child.wait()?;
    tracing::info!(dir = %dir.display(), %status, "dependency install finished");

    Ok(InstallReport {
        success: status.success(),
        output,
    })
}

fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

/// Lists known documentation, configuration and dependency files.
pub fn list_files(dir: &Path) -> ProjectFiles {
    ProjectFiles {
        documentation: collect_known(dir, DOCUMENTATION_FILES),
        configuration: collect_known(dir, CONFIGURATION_FILES),
        dependencies: collect_known(dir, DEPENDENCY_FILES),
    }
}

fn collect_known(dir: &Path, names: &[&str]) -> Vec<ProjectFile> {
    names
        .iter()
        .filter_map(|name| {
            let path = dir.join(name);
            let meta = fs::metadata(&path).ok().filter(|m| m.is_file())?;
            Some(ProjectFile {
                name: (*name).to_string(),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                preview: preview(&path),
                path,
            })
        })
        .collect()
}

fn preview(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes)
            .ok()
            .map(|text| text.chars().take(PREVIEW_CHARS).collect()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read project file");
            None
        }
    }
}

/// Reads a UTF-8 file that must resolve inside `dir`.
pub fn read_contained_file(dir: &Path, file: &Path) -> Result<String, String> {
    let root = fs::canonicalize(dir)
        .map_err(|e| format!("project directory {} unavailable: {e}", dir.display()))?;
    let requested = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    let resolved = match fs::canonicalize(&requested) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err("File not found".to_string())
        }
        Err(e) => return Err(format!("Error reading file: {e}")),
    };
    if !resolved.starts_with(&root) {
        return Err("File path is outside project directory".to_string());
    }
    if !resolved.is_file() {
        return Err("File not found".to_string());
    }

    match fs::read(&resolved) {
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|_| "File is not a text file or not UTF-8 encoded".to_string()),
        Err(e) => Err(format!("Error reading file: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_skip_comments_and_blanks() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("requirements.txt"),
            "# pinned\nflask==3.0\n\n  requests  \n",
        )
        .unwrap();
        let deps = read_dependencies(tmp.path(), "requirements.txt")
            .unwrap()
            .unwrap();
        assert_eq!(deps, vec!["flask==3.0", "requests"]);
    }

    #[test]
    fn missing_manifest_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_dependencies(tmp.path(), "requirements.txt")
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_files_groups_known_names() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README.md"), "# Demo\n").unwrap();
        fs::write(tmp.path().join("requirements.txt"), "flask\n").unwrap();
        fs::write(tmp.path().join("setup.py"), [0xff, 0xfe, 0x00]).unwrap();

        let files = list_files(tmp.path());
        assert_eq!(files.documentation.len(), 1);
        assert_eq!(files.documentation[0].preview.as_deref(), Some("# Demo\n"));
        assert_eq!(files.dependencies[0].name, "requirements.txt");
        assert_eq!(files.configuration[0].name, "setup.py");
        assert!(files.configuration[0].preview.is_none());
    }

    #[test]
    fn contained_read_rejects_escape() {
        let outer = tempfile::tempdir().unwrap();
        let project = outer.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("main.py"), "print('hi')\n").unwrap();
        fs::write(outer.path().join("secret.txt"), "nope").unwrap();

        assert_eq!(
            read_contained_file(&project, Path::new("main.py")).unwrap(),
            "print('hi')\n"
        );
        assert_eq!(
            read_contained_file(&project, Path::new("../secret.txt")).unwrap_err(),
            "File path is outside project directory"
        );
        assert_eq!(
            read_contained_file(&project, Path::new("missing.py")).unwrap_err(),
            "File not found"
        );
    }

    #[cfg(unix)]
    #[test]
    fn install_reports_installer_output_and_status() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("requirements.txt"), "flask\n").unwrap();
        let args = vec!["-c".to_string(), "echo installing \"$0\"; exit 3".to_string()];
        let report = install_dependencies(
            tmp.path(),
            Path::new("sh"),
            &args,
            "requirements.txt",
        )
        .unwrap();
        assert!(!report.success);
        assert_eq!(report.output.len(), 1);
        assert!(report.output[0].starts_with("installing "));
        assert!(report.output[0].ends_with("requirements.txt"));
    }
}
