use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::defaults::{OUTPUT_EXTENSION, OUTPUT_SUFFIX};
use crate::config::CompressionSettings;
use crate::error::{CompressError, Result};

/// One-in-one-out transcoding job over an ordered list of inputs.
///
/// Built once by the caller and consumed by a single orchestrator run. The
/// fields are private so the job cannot change after validation.
#[derive(Debug, Clone)]
pub struct CompressionJob {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    settings: CompressionSettings,
    outputs: Vec<PathBuf>,
}

impl CompressionJob {
    /// Validate the job and plan one output path per input.
    ///
    /// Fails with `InvalidJob` for an empty input list or a missing output
    /// directory, `Io` when the directory cannot be written, and
    /// `InvalidSettings` for out-of-domain settings.
    pub fn new(
        inputs: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
        settings: CompressionSettings,
    ) -> Result<Self> {
        let output_dir = output_dir.into();

        if inputs.is_empty() {
            return Err(CompressError::InvalidJob("no input files".to_string()));
        }
        settings.validate()?;
        check_output_dir(&output_dir)?;

        let outputs = output_paths(&inputs, &output_dir);
        Ok(Self {
            inputs,
            output_dir,
            settings,
            outputs,
        })
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Planned output path for input `index`
    pub fn output_path(&self, index: usize) -> Option<&Path> {
        self.outputs.get(index).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

fn check_output_dir(dir: &Path) -> Result<()> {
    let meta = std::fs::metadata(dir).map_err(|_| {
        CompressError::InvalidJob(format!("output directory {} does not exist", dir.display()))
    })?;
    if !meta.is_dir() {
        return Err(CompressError::InvalidJob(format!(
            "output path {} is not a directory",
            dir.display()
        )));
    }

    // Probe with a real file; permission bits alone miss ACLs and read-only mounts
    tempfile::tempfile_in(dir).map_err(|e| CompressError::io(dir, e))?;
    Ok(())
}

/// Plan `<dir>/<stem>_compressed.pdf` for every input.
///
/// Inputs sharing a stem get `_2`, `_3`, ... in input order so no output
/// overwrites another from the same job.
pub fn output_paths(inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());

            let count = seen.entry(stem.to_lowercase()).or_insert(0);
            *count += 1;

            let name = if *count == 1 {
                format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION)
            } else {
                format!("{}{}_{}.{}", stem, OUTPUT_SUFFIX, count, OUTPUT_EXTENSION)
            };
            output_dir.join(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_output_path_naming() {
        let paths = output_paths(&[PathBuf::from("/data/report.pdf")], Path::new("/out"));
        assert_eq!(paths, vec![PathBuf::from("/out/report_compressed.pdf")]);
    }

    #[test]
    fn test_colliding_stems_are_disambiguated() {
        let inputs = vec![
            PathBuf::from("/a/scan.pdf"),
            PathBuf::from("/b/scan.pdf"),
            PathBuf::from("/c/other.pdf"),
            PathBuf::from("/d/Scan.PDF"),
        ];
        let paths = output_paths(&inputs, Path::new("out"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("out/scan_compressed.pdf"),
                PathBuf::from("out/scan_compressed_2.pdf"),
                PathBuf::from("out/other_compressed.pdf"),
                PathBuf::from("out/Scan_compressed_3.pdf"),
            ]
        );
    }

    #[test]
    fn test_empty_job_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = CompressionJob::new(vec![], dir.path(), CompressionSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJob);
    }

    #[test]
    fn test_missing_output_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = CompressionJob::new(
            vec![PathBuf::from("a.pdf")],
            &missing,
            CompressionSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJob);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompressionSettings {
            dpi: 123,
            ..Default::default()
        };
        let err = CompressionJob::new(vec![PathBuf::from("a.pdf")], dir.path(), settings)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSettings);
    }

    #[test]
    fn test_valid_job_plans_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let job = CompressionJob::new(
            vec![PathBuf::from("x/a.pdf"), PathBuf::from("y/b.pdf")],
            dir.path(),
            CompressionSettings::default(),
        )
        .unwrap();
        assert_eq!(job.len(), 2);
        assert_eq!(job.output_path(1), Some(dir.path().join("b_compressed.pdf").as_path()));
        assert_eq!(job.output_path(2), None);
    }
}
