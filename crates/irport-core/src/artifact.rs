use std::path::{Path, PathBuf};

/// An IR model on disk: the graph document and its weights sidecar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelArtifact {
    pub xml: PathBuf,
    pub weights: PathBuf,
}

impl ModelArtifact {
    /// `model` -> `model.xml` + `model.bin`. The stem keeps any dots it already has.
    pub fn from_stem(stem: impl AsRef<Path>) -> Self {
        Self {
            xml: with_suffix(stem.as_ref(), ".xml"),
            weights: with_suffix(stem.as_ref(), ".bin"),
        }
    }
}

pub fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut raw = stem.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_with_dots_is_not_truncated() {
        let artifact = ModelArtifact::from_stem("out/model.v2");
        assert_eq!(artifact.xml, PathBuf::from("out/model.v2.xml"));
        assert_eq!(artifact.weights, PathBuf::from("out/model.v2.bin"));
    }
}
