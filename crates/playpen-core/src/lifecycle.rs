//! On-disk file lifecycle of a pipeline.
//!
//! ```text
//! <working_dir>/executable_files/<pipeline_id>/
//! ├── src/<pipeline_id>.<ext>   source written by the caller
//! └── bin/                      compiled artifacts
//! ```

use crate::environment::SdkKind;
use crate::error::{CoreError, Result};
use crate::types::PipelineId;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Folder under the working directory that holds every pipeline folder.
pub const BASE_FILES_FOLDER: &str = "executable_files";

const SOURCE_FOLDER: &str = "src";
const BIN_FOLDER: &str = "bin";

/// Resolves the name of the compiled artifact the run command executes.
///
/// Called with the pipeline ID and the bin folder after compilation
/// succeeded. Replaceable so tests and custom backends can plug in their
/// own lookup.
pub type ExecutableNameResolver =
    Arc<dyn Fn(PipelineId, &Path) -> Result<String> + Send + Sync>;

/// Files and folders owned by one pipeline.
#[derive(Clone)]
pub struct LifeCycle {
    kind: SdkKind,
    pipeline_id: PipelineId,
    base_folder: PathBuf,
    source_file: PathBuf,
    executable_file: PathBuf,
    executable_name: ExecutableNameResolver,
}

impl fmt::Debug for LifeCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifeCycle")
            .field("kind", &self.kind)
            .field("pipeline_id", &self.pipeline_id)
            .field("base_folder", &self.base_folder)
            .finish_non_exhaustive()
    }
}

impl LifeCycle {
    /// Describe the folders of `pipeline_id` under `working_dir`.
    ///
    /// Nothing is created on disk until [`create_folders`](Self::create_folders).
    pub fn new(kind: SdkKind, pipeline_id: PipelineId, working_dir: impl AsRef<Path>) -> Self {
        let base_folder = working_dir
            .as_ref()
            .join(BASE_FILES_FOLDER)
            .join(pipeline_id.to_string());
        let source_file = base_folder
            .join(SOURCE_FOLDER)
            .join(format!("{}.{}", pipeline_id, kind.source_extension()));
        let executable_file = match kind {
            SdkKind::Java => base_folder.join(BIN_FOLDER),
            SdkKind::Go => base_folder.join(BIN_FOLDER).join(pipeline_id.to_string()),
            SdkKind::Python | SdkKind::Shell => source_file.clone(),
        };
        let executable_name = default_resolver(kind, &source_file, &executable_file);

        Self {
            kind,
            pipeline_id,
            base_folder,
            source_file,
            executable_file,
            executable_name,
        }
    }

    /// Replace the executable name resolver.
    pub fn with_executable_name_resolver(mut self, resolver: ExecutableNameResolver) -> Self {
        self.executable_name = resolver;
        self
    }

    /// Backend kind of the pipeline.
    pub fn kind(&self) -> SdkKind {
        self.kind
    }

    /// ID of the pipeline.
    pub fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Create the source and bin folders.
    pub async fn create_folders(&self) -> Result<()> {
        for folder in [self.absolute_source_folder_path(), self.absolute_bin_folder_path()] {
            tokio::fs::create_dir_all(&folder).await?;
        }
        tracing::debug!(
            pipeline_id = %self.pipeline_id,
            path = %self.base_folder.display(),
            "Pipeline folders created"
        );
        Ok(())
    }

    /// Write the submitted code to the source file.
    pub async fn create_source_code_file(&self, code: &str) -> Result<PathBuf> {
        if !self.absolute_source_folder_path().is_dir() {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "source folder {} does not exist",
                    self.absolute_source_folder_path().display()
                ),
            )));
        }
        tokio::fs::write(&self.source_file, code).await?;
        tracing::debug!(
            pipeline_id = %self.pipeline_id,
            path = %self.source_file.display(),
            code_len = code.len(),
            "Source file written"
        );
        Ok(self.source_file.clone())
    }

    /// Remove every file of the pipeline.
    pub async fn delete_folders(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.base_folder).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(pipeline_id = %self.pipeline_id, "Pipeline folders removed");
        Ok(())
    }

    /// Root folder of the pipeline; commands run here.
    pub fn absolute_base_folder_path(&self) -> &Path {
        &self.base_folder
    }

    /// Folder holding the source file.
    pub fn absolute_source_folder_path(&self) -> PathBuf {
        self.base_folder.join(SOURCE_FOLDER)
    }

    /// Folder holding compiled artifacts.
    pub fn absolute_bin_folder_path(&self) -> PathBuf {
        self.base_folder.join(BIN_FOLDER)
    }

    /// Path of the source file.
    pub fn absolute_source_file_path(&self) -> &Path {
        &self.source_file
    }

    /// Path of the artifact the run command executes.
    ///
    /// For Java this is the class folder; the class name comes from the
    /// executable name resolver.
    pub fn absolute_executable_file_path(&self) -> &Path {
        &self.executable_file
    }

    /// Ask the resolver for the artifact name, looking in the bin folder.
    pub fn resolve_executable_name(&self) -> Result<String> {
        (self.executable_name)(self.pipeline_id, &self.absolute_bin_folder_path())
    }
}

/// Create the folders of a new pipeline and write its source.
///
/// Failures here are infrastructure failures: they are returned to the
/// caller and no status is recorded.
pub async fn prepare(
    kind: SdkKind,
    pipeline_id: PipelineId,
    working_dir: impl AsRef<Path>,
    code: &str,
) -> Result<LifeCycle> {
    let lc = LifeCycle::new(kind, pipeline_id, working_dir);
    lc.create_folders().await?;
    lc.create_source_code_file(code).await?;
    Ok(lc)
}

fn default_resolver(kind: SdkKind, source_file: &Path, executable_file: &Path) -> ExecutableNameResolver {
    match kind {
        SdkKind::Java => {
            let source_file = source_file.to_path_buf();
            let resolver: ExecutableNameResolver =
                Arc::new(move |_: PipelineId, dir: &Path| java_main_class(dir, &source_file));
            resolver
        }
        SdkKind::Go | SdkKind::Python | SdkKind::Shell => {
            let name = executable_file.to_string_lossy().into_owned();
            let resolver: ExecutableNameResolver =
                Arc::new(move |_: PipelineId, _: &Path| -> Result<String> { Ok(name.clone()) });
            resolver
        }
    }
}

/// Find the class to launch among the compiled classes in `dir`.
///
/// A single top-level class wins outright. With several, the class whose
/// body declares `static void main` in the source is chosen.
fn java_main_class(dir: &Path, source_file: &Path) -> Result<String> {
    let mut classes: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "class"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|stem| !stem.contains('$'))
        .collect();
    classes.sort();

    match classes.len() {
        0 => Err(CoreError::Artifact {
            dir: dir.to_path_buf(),
            reason: "no compiled classes".into(),
        }),
        1 => Ok(classes.remove(0)),
        _ => {
            let source = std::fs::read_to_string(source_file)?;
            match class_declaring_main(&source) {
                Some(name) if classes.contains(&name) => Ok(name),
                _ => Err(CoreError::Artifact {
                    dir: dir.to_path_buf(),
                    reason: format!("no main class among {}", classes.join(", ")),
                }),
            }
        }
    }
}

/// Name of the last class declared before the first `static void main`.
fn class_declaring_main(source: &str) -> Option<String> {
    let main_at = source.find("static void main")?;
    let before = &source[..main_at];
    let tokens: Vec<&str> = before
        .split(|c: char| c.is_whitespace() || c == '{')
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(2)
        .filter(|pair| pair[0] == "class")
        .map(|pair| pair[1].to_string())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_executable_name(_: PipelineId, _: &Path) -> Result<String> {
        Ok("fakeFileName".into())
    }

    #[test]
    fn test_paths() {
        let id = PipelineId::new();
        let lc = LifeCycle::new(SdkKind::Java, id, "/work");
        let base = PathBuf::from("/work").join(BASE_FILES_FOLDER).join(id.to_string());
        assert_eq!(lc.absolute_base_folder_path(), base);
        assert_eq!(
            lc.absolute_source_file_path(),
            base.join("src").join(format!("{id}.java"))
        );
        assert_eq!(lc.absolute_bin_folder_path(), base.join("bin"));
    }

    #[test]
    fn test_interpreted_executable_is_source() {
        let lc = LifeCycle::new(SdkKind::Python, PipelineId::new(), "/work");
        assert_eq!(
            lc.absolute_executable_file_path(),
            lc.absolute_source_file_path()
        );
        assert_eq!(
            lc.resolve_executable_name().unwrap(),
            lc.absolute_source_file_path().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let lc = prepare(SdkKind::Shell, PipelineId::new(), dir.path(), "echo hi\n")
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(lc.absolute_source_file_path()).unwrap(),
            "echo hi\n"
        );
        assert!(lc.absolute_bin_folder_path().is_dir());

        lc.delete_folders().await.unwrap();
        assert!(!lc.absolute_base_folder_path().exists());
        // deleting twice is fine
        lc.delete_folders().await.unwrap();
    }

    #[tokio::test]
    async fn test_source_requires_folders() {
        let dir = tempfile::tempdir().unwrap();
        let lc = LifeCycle::new(SdkKind::Shell, PipelineId::new(), dir.path());
        assert!(lc.create_source_code_file("echo hi").await.is_err());
    }

    #[test]
    fn test_resolver_can_be_replaced() {
        let lc = LifeCycle::new(SdkKind::Java, PipelineId::new(), "/work")
            .with_executable_name_resolver(Arc::new(fake_executable_name));
        assert_eq!(lc.resolve_executable_name().unwrap(), "fakeFileName");
    }

    #[test]
    fn test_java_single_class() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("HelloWorld.class"), b"").unwrap();
        std::fs::write(dir.path().join("HelloWorld$1.class"), b"").unwrap();
        let name = java_main_class(dir.path(), Path::new("/nonexistent")).unwrap();
        assert_eq!(name, "HelloWorld");
    }

    #[test]
    fn test_java_main_class_among_many() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Main.java");
        std::fs::write(
            &source,
            "class Helper {\n  int x;\n}\nclass Entry {\n  public static void main(String[] a) {}\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("Helper.class"), b"").unwrap();
        std::fs::write(dir.path().join("Entry.class"), b"").unwrap();
        assert_eq!(java_main_class(dir.path(), &source).unwrap(), "Entry");
    }

    #[test]
    fn test_java_no_classes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            java_main_class(dir.path(), Path::new("/nonexistent")),
            Err(CoreError::Artifact { .. })
        ));
    }

    #[test]
    fn test_class_declaring_main() {
        assert_eq!(
            class_declaring_main("public class A{ public static void main(String[] a){} }"),
            Some("A".into())
        );
        assert_eq!(class_declaring_main("class A {}"), None);
    }
}
