//! Classpath strings and pathing-jar expansion.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// Platform classpath separator.
#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";
/// Platform classpath separator.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: &str = ":";

/// Join classpath entries, skipping empty ones.
pub fn join_classpath<I, S>(entries: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter(|entry| !entry.as_ref().is_empty())
        .map(|entry| entry.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Split a classpath string into its non-empty entries.
pub fn split_classpath(classpath: &str) -> Vec<String> {
    classpath
        .split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// True if `entry` names a jar whose file name contains `marker`.
pub fn is_pathing_jar(entry: &str, marker: &str) -> bool {
    let path = Path::new(entry);
    let is_jar = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
    let name_matches = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(marker));
    is_jar && name_matches
}

/// Extract the `Class-Path` attribute from a jar manifest.
///
/// Manifest lines are wrapped at 72 bytes; a line starting with a single
/// space continues the previous one.
pub fn parse_manifest_class_path(manifest: &str) -> Vec<String> {
    let mut logical: Vec<String> = Vec::new();
    for raw in manifest.lines() {
        let line = raw.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(last) = logical.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        logical.push(line.to_string());
    }

    logical
        .iter()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("Class-Path")
                .then(|| value.to_string())
        })
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn resolve_manifest_entry(jar: &Path, entry: &str) -> PathBuf {
    let entry = entry.strip_prefix("file:").unwrap_or(entry);
    let candidate = PathBuf::from(entry);
    if candidate.is_absolute() {
        return candidate;
    }
    jar.parent()
        .map(|dir| dir.join(&candidate))
        .unwrap_or(candidate)
}

fn read_manifest(jar: &Path) -> Result<String, ZipError> {
    let mut archive = ZipArchive::new(File::open(jar)?)?;
    let mut entry = archive.by_name(MANIFEST_ENTRY)?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Replace every pathing jar with the entries of its manifest `Class-Path`.
///
/// A jar whose manifest cannot be read is kept as is.
pub fn expand_pathing_jars(entries: &[String], marker: &str) -> Vec<String> {
    let mut expanded = Vec::with_capacity(entries.len());
    for entry in entries {
        if !is_pathing_jar(entry, marker) {
            expanded.push(entry.clone());
            continue;
        }
        let jar = Path::new(entry);
        match read_manifest(jar) {
            Ok(manifest) => {
                let inner = parse_manifest_class_path(&manifest);
                debug!(jar = %entry, entries = inner.len(), "expanded pathing jar");
                expanded.extend(
                    inner
                        .iter()
                        .map(|item| resolve_manifest_entry(jar, item).display().to_string()),
                );
            }
            Err(err) => {
                warn!(jar = %entry, error = %err, "cannot read manifest of pathing jar");
                expanded.push(entry.clone());
            }
        }
    }
    expanded
}

/// Compile classpath: target project entries, then the generator's own, with
/// pathing jars expanded.
pub fn compile_classpath(target: &str, generator: &str, marker: &str) -> String {
    let mut entries = split_classpath(target);
    entries.extend(split_classpath(generator));
    join_classpath(expand_pathing_jars(&entries, marker))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_jar(path: &Path, manifest: Option<&str>) {
        let file = File::create(path).expect("jar should be created");
        let mut jar = ZipWriter::new(file);
        if let Some(manifest) = manifest {
            jar.start_file(MANIFEST_ENTRY, SimpleFileOptions::default())
                .expect("manifest entry should start");
            jar.write_all(manifest.as_bytes())
                .expect("manifest should be written");
        }
        jar.start_file("com/example/Main.class", SimpleFileOptions::default())
            .expect("class entry should start");
        jar.write_all(b"\xca\xfe\xba\xbe").expect("class should be written");
        jar.finish().expect("jar should be finished");
    }

    #[test]
    fn join_and_split_skip_empty_entries() {
        let joined = join_classpath(["a.jar", "", "b"]);
        assert_eq!(joined, format!("a.jar{PATH_SEPARATOR}b"));
        assert_eq!(split_classpath(&joined), vec!["a.jar", "b"]);
        assert!(split_classpath("").is_empty());
    }

    #[test]
    fn pathing_jar_detection_uses_extension_and_marker() {
        assert!(is_pathing_jar("/x/lib/app-pathing.jar", "pathing"));
        assert!(is_pathing_jar("/x/lib/APP-pathing.JAR", "pathing"));
        assert!(!is_pathing_jar("/x/lib/pathing/app.jar", "pathing"));
        assert!(!is_pathing_jar("/x/lib/app-pathing.zip", "pathing"));
    }

    #[test]
    fn manifest_continuation_lines_are_joined() {
        let manifest = "Manifest-Version: 1.0\r\nClass-Path: lib/a.jar lib/\r\n \
                        b.jar file:/opt/c.jar\r\nCreated-By: x\r\n";
        assert_eq!(
            parse_manifest_class_path(manifest),
            vec!["lib/a.jar", "lib/b.jar", "file:/opt/c.jar"]
        );
        assert!(parse_manifest_class_path("Manifest-Version: 1.0\n").is_empty());
    }

    #[test]
    fn manifest_entries_resolve_relative_to_jar() {
        let jar = Path::new("/work/lib/app-pathing.jar");
        assert_eq!(
            resolve_manifest_entry(jar, "deps/x.jar"),
            PathBuf::from("/work/lib/deps/x.jar")
        );
        assert_eq!(
            resolve_manifest_entry(jar, "file:/opt/y.jar"),
            PathBuf::from("/opt/y.jar")
        );
    }

    #[test]
    fn non_pathing_entries_pass_through() {
        let cp = compile_classpath("target/classes", "gen.jar", "pathing");
        assert_eq!(cp, join_classpath(["target/classes", "gen.jar"]));
    }

    #[test]
    fn pathing_jar_is_replaced_by_its_manifest_entries() {
        let tmp = tempdir().expect("tempdir should be created");
        let jar = tmp.path().join("app-pathing.jar");
        write_jar(
            &jar,
            Some("Manifest-Version: 1.0\r\nClass-Path: deps/a.jar file:/opt/b.jar\r\n\r\n"),
        );
        let jar = jar.display().to_string();

        let expanded = expand_pathing_jars(&[jar, "target/classes".to_string()], "pathing");
        assert_eq!(
            expanded,
            vec![
                tmp.path().join("deps/a.jar").display().to_string(),
                "/opt/b.jar".to_string(),
                "target/classes".to_string(),
            ]
        );
    }

    #[test]
    fn unreadable_pathing_jar_is_kept() {
        let tmp = tempdir().expect("tempdir should be created");
        let without_manifest = tmp.path().join("bare-pathing.jar");
        write_jar(&without_manifest, None);
        let missing = tmp.path().join("missing-pathing.jar");
        let entries = vec![
            without_manifest.display().to_string(),
            missing.display().to_string(),
        ];
        assert_eq!(expand_pathing_jars(&entries, "pathing"), entries);
    }
}
