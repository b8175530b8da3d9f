//! CMake build backend.
//!
//! Runs the three steps against an out-of-tree build directory:
//!
//! | Step | Command |
//! |---|---|
//! | configure | `cmake -S <src> -B <build> [-G <generator>] -DCMAKE_INSTALL_PREFIX=<prefix> -DCMAKE_BUILD_TYPE=<type> <args>` |
//! | build | `cmake --build <build> --parallel <jobs>` |
//! | install | `cmake --install <build>` |
//!
//! Source trees are expected at `<sources>/<package>/<source_dir>`; kiln
//! does not fetch them. Output of every step goes to its own log file and a
//! failing step reports the tail of that log.
//!
//! Blueprint configure arguments may use these placeholders:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{{prefix}}` | Install prefix |
//! | `{{libdir}}` | `<prefix>/lib` |
//! | `{{version}}` | Version being configured |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use kiln_schema::{PackageDescriptor, PackageName, SourceLocation, Version};

use crate::backend::BuildBackend;
use crate::config::CmakeConfig;
use crate::error::{BackendError, Step};
use crate::packaging::PackageManifest;
use crate::paths;

/// Fixed epoch for reproducible timestamps.
const SOURCE_DATE_EPOCH: &str = "0";

/// Lines of log shown when a step fails.
const LOG_TAIL_LINES: usize = 20;

/// Drives the `cmake` executable.
#[derive(Debug)]
pub struct CmakeBackend {
    program: PathBuf,
    config: CmakeConfig,
    jobs: usize,
    configured: Mutex<HashMap<PackageName, Version>>,
}

impl CmakeBackend {
    /// Locate `cmake` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if no `cmake` executable can be found.
    pub fn new(config: CmakeConfig) -> Result<Self, which::Error> {
        let program = which::which("cmake")?;
        tracing::debug!(cmake = %program.display(), "using cmake");
        Ok(Self::with_program(program, config))
    }

    /// Use an explicit `cmake` executable.
    pub fn with_program(program: PathBuf, config: CmakeConfig) -> Self {
        let jobs = config.jobs.unwrap_or_else(num_cpus::get).max(1);
        Self {
            program,
            config,
            jobs,
            configured: Mutex::new(HashMap::new()),
        }
    }

    /// Source tree for `version` of `descriptor`.
    pub fn source_dir(&self, descriptor: &PackageDescriptor, version: &Version) -> PathBuf {
        let root = self
            .config
            .sources_dir
            .join(paths::package_dir_name(&descriptor.name));
        match descriptor.source(version).and_then(SourceLocation::source_dir) {
            Some(sub) => root.join(sub),
            None => root,
        }
    }

    /// Out-of-tree build directory for `descriptor`.
    pub fn build_dir(&self, descriptor: &PackageDescriptor) -> PathBuf {
        self.config
            .build_dir
            .join(paths::package_dir_name(&descriptor.name))
    }

    /// Full argument list for the configure step.
    pub fn configure_args(&self, descriptor: &PackageDescriptor, version: &Version) -> Vec<String> {
        let prefix = self.config.install_prefix.display().to_string();
        let libdir = self.config.install_prefix.join("lib").display().to_string();

        let mut args = vec![
            "-S".to_string(),
            self.source_dir(descriptor, version).display().to_string(),
            "-B".to_string(),
            self.build_dir(descriptor).display().to_string(),
        ];
        if let Some(generator) = &self.config.generator {
            args.push("-G".to_string());
            args.push(generator.clone());
        }
        args.push(format!("-DCMAKE_INSTALL_PREFIX={prefix}"));
        args.push(format!("-DCMAKE_BUILD_TYPE={}", self.config.build_type));

        args.extend(descriptor.configure_args.iter().map(|arg| {
            arg.replace("{{prefix}}", &prefix)
                .replace("{{libdir}}", &libdir)
                .replace("{{version}}", version.as_str())
        }));
        args
    }

    async fn run(
        &self,
        descriptor: &PackageDescriptor,
        step: Step,
        args: &[String],
    ) -> Result<(), BackendError> {
        let fail = |message: String| BackendError::new(step, message);

        std::fs::create_dir_all(&self.config.log_dir)
            .map_err(|e| fail(format!("failed to create log directory: {e}")))?;
        let log_path = paths::step_log_path(&self.config.log_dir, &descriptor.name, step.as_str());
        let log_file = std::fs::File::create(&log_path)
            .map_err(|e| fail(format!("failed to create {}: {e}", log_path.display())))?;
        let log_err = log_file
            .try_clone()
            .map_err(|e| fail(format!("failed to open {}: {e}", log_path.display())))?;

        tracing::debug!(
            package = %descriptor.name,
            %step,
            log = %log_path.display(),
            "running cmake"
        );

        let status = tokio::process::Command::new(&self.program)
            .args(args)
            .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
            .env("CMAKE_PREFIX_PATH", &self.config.install_prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_err))
            .status()
            .await
            .map_err(|e| fail(format!("failed to execute {}: {e}", self.program.display())))?;

        if status.success() {
            return Ok(());
        }

        let tail = read_last_lines(&log_path, LOG_TAIL_LINES).unwrap_or_default();
        Err(fail(format!(
            "cmake exited with {status} (full log: {})\n{tail}",
            log_path.display()
        )))
    }

    fn write_manifest(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
        let configured = self
            .configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&descriptor.name)
            .cloned();
        let manifest = PackageManifest::new(descriptor, configured.as_ref());
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| BackendError::new(Step::Install, e.to_string()))?;

        let path = self.build_dir(descriptor).join("package.json");
        std::fs::write(&path, json).map_err(|e| {
            BackendError::new(
                Step::Install,
                format!("failed to write {}: {e}", path.display()),
            )
        })
    }
}

#[async_trait]
impl BuildBackend for CmakeBackend {
    async fn configure(
        &self,
        descriptor: &PackageDescriptor,
        version: &Version,
    ) -> Result<(), BackendError> {
        let source = self.source_dir(descriptor, version);
        if !source.is_dir() {
            return Err(BackendError::new(
                Step::Configure,
                format!("source tree not found at {}", source.display()),
            ));
        }
        std::fs::create_dir_all(self.build_dir(descriptor)).map_err(|e| {
            BackendError::new(Step::Configure, format!("failed to create build directory: {e}"))
        })?;

        self.run(descriptor, Step::Configure, &self.configure_args(descriptor, version))
            .await?;

        self.configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.name.clone(), version.clone());
        Ok(())
    }

    async fn build(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
        let args = vec![
            "--build".to_string(),
            self.build_dir(descriptor).display().to_string(),
            "--parallel".to_string(),
            self.jobs.to_string(),
        ];
        self.run(descriptor, Step::Build, &args).await
    }

    async fn install(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
        let args = vec![
            "--install".to_string(),
            self.build_dir(descriptor).display().to_string(),
        ];
        self.run(descriptor, Step::Install, &args).await?;
        self.write_manifest(descriptor)
    }
}

/// Read the last `n` lines of a log file.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Read at most 16KB from the end
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&buffer[..], |idx| &buffer[idx + 1..])
    } else {
        &buffer[..]
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
