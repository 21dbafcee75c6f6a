//! External tools the actions drive: rsync, gphoto2, the GPS downloader, the
//! photo catalog sync and the power-off command.
//!
//! Every call blocks until the tool exits and may be repeated safely.

use crate::config::{BackupConfig, CommandsConfig};
use crate::error::{BackupError, Result};
use crate::identity::secure_filename;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Longest stderr excerpt kept in a [`BackupError::CommandFailed`].
const STDERR_EXCERPT: usize = 512;
/// gphoto2 prints this once per downloaded file.
const SAVED_FILE_MARKER: &str = "Saving file as";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// Import new photos only.
    Normal,
    /// Rebuild the catalog from the backup tree.
    Replace,
}

impl CatalogMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for CatalogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A camera found by auto-detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Camera {
    pub model: String,
    pub port: String,
}

/// Blocking, idempotent operations the backup actions are built from.
pub trait BackupTools: Send + Sync {
    /// Mirror the contents of `source` into `dest`.
    fn mirror_volume(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Flush filesystem buffers to disk.
    fn flush_disks(&self) -> Result<()>;

    /// Update the modification time of `path`.
    fn touch(&self, path: &Path) -> Result<()>;

    /// Copy new files from every connected camera into
    /// `<backup_root>/<camera name>/`. Returns the number of files copied.
    fn copy_cameras(&self, backup_root: &Path) -> Result<usize>;

    /// Download the track of the connected GPS logger into `output`.
    fn download_gps_track(&self, output: &Path) -> Result<()>;

    fn sync_catalog(&self, mode: CatalogMode) -> Result<()>;

    fn power_off(&self) -> Result<()>;
}

/// [`BackupTools`] backed by the configured command templates.
#[derive(Debug, Clone)]
pub struct SystemTools {
    commands: CommandsConfig,
    backup_root: PathBuf,
    catalog_data_dir: PathBuf,
    catalog_config: PathBuf,
}

impl SystemTools {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            backup_root: config.backup_root.clone(),
            catalog_data_dir: config.catalog_data_dir.clone(),
            catalog_config: config.catalog_config.clone(),
        }
    }

    fn run(
        &self,
        name: &'static str,
        template: &[String],
        vars: &[(&str, &Path)],
        cwd: Option<&Path>,
    ) -> Result<Output> {
        let mut command = render(name, template, vars)?;
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        debug!(tool = name, ?command, "Running external command");

        let program = command.get_program().to_string_lossy().into_owned();
        let output = command.output().map_err(|source| BackupError::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BackupError::CommandFailed {
                program,
                status: output.status,
                stderr: stderr_excerpt(&output.stderr),
            });
        }
        Ok(output)
    }
}

impl BackupTools for SystemTools {
    fn mirror_volume(&self, source: &Path, dest: &Path) -> Result<()> {
        self.run(
            "mirror",
            &self.commands.mirror,
            &[("source", source), ("dest", dest)],
            None,
        )?;
        Ok(())
    }

    fn flush_disks(&self) -> Result<()> {
        self.run("flush", &self.commands.flush, &[], None)?;
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<()> {
        self.run("touch", &self.commands.touch, &[("path", path)], None)?;
        Ok(())
    }

    fn copy_cameras(&self, backup_root: &Path) -> Result<usize> {
        let detected = self.run("camera-detect", &self.commands.camera_detect, &[], None)?;
        let cameras = parse_auto_detect(&String::from_utf8_lossy(&detected.stdout));

        let mut copies = 0;
        for (index, camera) in cameras.iter().enumerate() {
            info!("Camera[{}] = {}, {}", index, camera.model, camera.port);

            let dest = backup_root.join(camera_dir_name(&camera.model));
            fs::create_dir_all(&dest)?;
            info!("Starting backup for {} to {}", camera.model, dest.display());

            let output = self.run(
                "camera-copy",
                &self.commands.camera_copy,
                &[
                    ("camera", Path::new(&camera.model)),
                    ("port", Path::new(&camera.port)),
                ],
                Some(dest.as_path()),
            )?;
            let copied = count_saved_files(&String::from_utf8_lossy(&output.stdout));
            info!(
                "Finished backup for {}, {} files copied",
                camera.model, copied
            );
            copies += copied;
        }
        Ok(copies)
    }

    fn download_gps_track(&self, output: &Path) -> Result<()> {
        self.run(
            "gps-download",
            &self.commands.gps_download,
            &[("output", output)],
            None,
        )?;
        Ok(())
    }

    fn sync_catalog(&self, mode: CatalogMode) -> Result<()> {
        self.run(
            "catalog-sync",
            &self.commands.catalog_sync,
            &[
                ("mode", Path::new(mode.as_str())),
                ("source", self.backup_root.as_path()),
                ("data_dir", self.catalog_data_dir.as_path()),
                ("config", self.catalog_config.as_path()),
            ],
            None,
        )?;
        Ok(())
    }

    fn power_off(&self) -> Result<()> {
        self.run("power-off", &self.commands.power_off, &[], None)?;
        Ok(())
    }
}

/// Build a command from `template`, replacing every `{name}` with its value.
pub fn render(name: &'static str, template: &[String], vars: &[(&str, &Path)]) -> Result<Command> {
    let (program, args) = template
        .split_first()
        .ok_or(BackupError::EmptyCommand(name))?;

    let mut command = Command::new(substitute(program, vars));
    command.args(args.iter().map(|arg| substitute(arg, vars)));
    Ok(command)
}

fn substitute(arg: &str, vars: &[(&str, &Path)]) -> OsString {
    let mut rendered = arg.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &value.to_string_lossy());
        }
    }
    OsString::from(rendered)
}

/// Parse the table printed by `gphoto2 --auto-detect`:
///
/// ```text
/// Model                          Port
/// ----------------------------------------------------------
/// Canon EOS 5D Mark III          usb:001,004
/// ```
pub fn parse_auto_detect(stdout: &str) -> Vec<Camera> {
    stdout
        .lines()
        .skip_while(|line| !line.starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let line = line.trim_end();
            let split = line.rfind(char::is_whitespace)?;
            let model = line[..split].trim();
            let port = line[split..].trim();
            if model.is_empty() || port.is_empty() {
                return None;
            }
            Some(Camera {
                model: model.to_string(),
                port: port.to_string(),
            })
        })
        .collect()
}

pub fn count_saved_files(stdout: &str) -> usize {
    stdout
        .lines()
        .filter(|line| line.trim_start().starts_with(SAVED_FILE_MARKER))
        .count()
}

fn camera_dir_name(model: &str) -> String {
    let name = secure_filename(model);
    if name.is_empty() {
        "camera".to_string()
    } else {
        name
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_EXCERPT - 1)
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}
