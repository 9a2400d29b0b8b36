use std::path::PathBuf;

/// Host-side failures. GPU-API failures are not represented here: resource
/// creation and submission errors abort the affected operation outright, there
/// is no retry or degraded-mode path for them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scene assets root {0:?} does not exist")]
    AssetsRootMissing(PathBuf),

    #[error("no scene manifests found under {0:?}")]
    EmptyCatalog(PathBuf),

    #[error("scene {0:?} not found")]
    SceneNotFound(PathBuf),

    #[error("scene {0:?} contains no meshes")]
    EmptyScene(PathBuf),

    #[error("failed to parse scene manifest {path:?}")]
    SceneParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load mesh {path:?}")]
    MeshLoad {
        path: PathBuf,
        #[source]
        source: obj::ObjError,
    },

    #[error("failed to load environment map {path:?}")]
    Environment {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("malformed capture file: {0}")]
    CaptureFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
