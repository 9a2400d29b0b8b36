//! Scene catalog and loader.
//!
//! A scene is described by a JSON manifest next to its mesh files: camera
//! pose, renderer defaults, a mesh list with per-mesh material and instance
//! placements, optional analytic lights and an optional HDR environment map.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use nalgebra::{Matrix4, Point3, Vector3};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::render_system::vertex::MeshVertex;

fn default_scale() -> f32 {
    1.0
}

fn default_albedo() -> [f32; 3] {
    [0.75, 0.75, 0.75]
}

fn default_radius() -> f32 {
    0.5
}

#[derive(Deserialize)]
struct ManifestCamera {
    eye: [f32; 3],
    look_at: [f32; 3],
    #[serde(default = "ManifestCamera::default_fov")]
    fov: f32,
}

impl ManifestCamera {
    fn default_fov() -> f32 {
        45.0
    }
}

#[derive(Deserialize)]
struct ManifestRenderer {
    #[serde(default = "ManifestRenderer::default_max_depth")]
    max_depth: u32,
    #[serde(default)]
    use_env_map: bool,
    #[serde(default = "default_scale")]
    hdr_multiplier: f32,
    #[serde(default = "ManifestRenderer::default_resolution")]
    resolution: [u32; 2],
}

impl ManifestRenderer {
    fn default_max_depth() -> u32 {
        4
    }

    fn default_resolution() -> [u32; 2] {
        [1280, 720]
    }
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        ManifestRenderer {
            max_depth: Self::default_max_depth(),
            use_env_map: false,
            hdr_multiplier: 1.0,
            resolution: Self::default_resolution(),
        }
    }
}

#[derive(Deserialize)]
struct ManifestInstance {
    #[serde(default)]
    translation: [f32; 3],
    #[serde(default = "default_scale")]
    scale: f32,
}

#[derive(Deserialize)]
struct ManifestMesh {
    file: String,
    #[serde(default = "default_albedo")]
    albedo: [f32; 3],
    #[serde(default)]
    emission: [f32; 3],
    #[serde(default)]
    instances: Vec<ManifestInstance>,
}

#[derive(Deserialize)]
struct ManifestLight {
    position: [f32; 3],
    #[serde(default = "default_radius")]
    radius: f32,
    emission: [f32; 3],
}

#[derive(Deserialize)]
struct SceneManifest {
    camera: ManifestCamera,
    #[serde(default)]
    renderer: ManifestRenderer,
    meshes: Vec<ManifestMesh>,
    #[serde(default)]
    lights: Vec<ManifestLight>,
    environment: Option<String>,
}

/// Renderer defaults the settings snapshot adopts when the scene loads.
#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    pub max_depth: u32,
    pub use_env_map: bool,
    pub hdr_multiplier: f32,
    pub resolution: [u32; 2],
}

pub struct CameraPose {
    pub eye: Point3<f32>,
    pub look_at: Point3<f32>,
    pub fov: f32,
}

pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

pub struct SceneInstance {
    pub mesh: usize,
    pub transform: Matrix4<f32>,
    pub albedo: [f32; 3],
    pub emission: [f32; 3],
}

pub struct SceneLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub emission: [f32; 3],
}

/// Decoded RGBA32F environment map.
pub struct Environment {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

pub struct Scene {
    pub name: String,
    pub camera: CameraPose,
    pub meshes: Vec<MeshData>,
    pub instances: Vec<SceneInstance>,
    pub lights: Vec<SceneLight>,
    pub environment: Option<Environment>,
    pub options: RendererOptions,
}

impl Scene {
    pub fn load(manifest_path: &Path) -> Result<Scene> {
        let file = File::open(manifest_path).map_err(|_| {
            Error::SceneNotFound(manifest_path.to_owned())
        })?;
        let manifest: SceneManifest =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::SceneParse {
                path: manifest_path.to_owned(),
                source,
            })?;

        if manifest.meshes.is_empty() {
            return Err(Error::EmptyScene(manifest_path.to_owned()));
        }

        let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let name = manifest_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_owned());

        let mut meshes = Vec::with_capacity(manifest.meshes.len());
        let mut instances = Vec::new();
        for (mesh_index, mesh) in manifest.meshes.iter().enumerate() {
            meshes.push(load_mesh(&dir.join(&mesh.file))?);

            let identity = [ManifestInstance {
                translation: [0.0; 3],
                scale: 1.0,
            }];
            let placements: &[ManifestInstance] = if mesh.instances.is_empty() {
                &identity
            } else {
                &mesh.instances
            };
            for placement in placements {
                instances.push(SceneInstance {
                    mesh: mesh_index,
                    transform: Matrix4::new_translation(&Vector3::from(placement.translation))
                        * Matrix4::new_scaling(placement.scale),
                    albedo: mesh.albedo,
                    emission: mesh.emission,
                });
            }
        }

        let environment = match (&manifest.environment, manifest.renderer.use_env_map) {
            (Some(file), true) => Some(load_environment(&dir.join(file))?),
            _ => None,
        };

        let lights = manifest
            .lights
            .iter()
            .map(|l| SceneLight {
                position: l.position,
                radius: l.radius,
                emission: l.emission,
            })
            .collect();

        Ok(Scene {
            name,
            camera: CameraPose {
                eye: Point3::from(manifest.camera.eye),
                look_at: Point3::from(manifest.camera.look_at),
                fov: manifest.camera.fov,
            },
            meshes,
            instances,
            lights,
            environment,
            options: RendererOptions {
                max_depth: manifest.renderer.max_depth,
                use_env_map: manifest.renderer.use_env_map,
                hdr_multiplier: manifest.renderer.hdr_multiplier,
                resolution: manifest.renderer.resolution,
            },
        })
    }

    pub fn use_hdr(&self) -> bool {
        self.environment.is_some()
    }

    /// Horizontal resolution of the environment map, zero without one; the
    /// trace shader uses it for its importance heuristics.
    pub fn hdr_resolution(&self) -> f32 {
        self.environment
            .as_ref()
            .map(|e| e.width as f32)
            .unwrap_or(0.0)
    }

    pub fn light_count(&self) -> u32 {
        self.lights.len() as u32
    }
}

fn load_mesh(path: &Path) -> Result<MeshData> {
    let file = File::open(path).map_err(|source| Error::MeshLoad {
        path: path.to_owned(),
        source: obj::ObjError::Io(source),
    })?;
    let model: obj::Obj<obj::Vertex, u32> =
        obj::load_obj(BufReader::new(file)).map_err(|source| Error::MeshLoad {
            path: path.to_owned(),
            source,
        })?;

    Ok(MeshData {
        vertices: model
            .vertices
            .into_iter()
            .map(|v| MeshVertex {
                position: v.position,
                normal: v.normal,
            })
            .collect(),
        indices: model.indices,
    })
}

fn load_environment(path: &Path) -> Result<Environment> {
    let decoded = image::open(path)
        .map_err(|source| Error::Environment {
            path: path.to_owned(),
            source,
        })?
        .to_rgba32f();
    Ok(Environment {
        width: decoded.width(),
        height: decoded.height(),
        pixels: decoded.into_raw(),
    })
}

struct CatalogEntry {
    name: String,
    manifest: PathBuf,
}

/// The set of scenes available under the assets root, in name order. A
/// missing root is the one fatal-at-startup condition.
pub struct SceneCatalog {
    entries: Vec<CatalogEntry>,
}

impl SceneCatalog {
    pub fn discover(root: &Path) -> Result<SceneCatalog> {
        if !root.is_dir() {
            return Err(Error::AssetsRootMissing(root.to_owned()));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                entries.push(CatalogEntry {
                    name: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    manifest: path,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        if entries.is_empty() {
            return Err(Error::EmptyCatalog(root.to_owned()));
        }
        Ok(SceneCatalog { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self, id: usize) -> &str {
        &self.entries[id].name
    }

    pub fn manifest_path(&self, id: usize) -> &Path {
        &self.entries[id].manifest
    }

    /// A scene switch is only honored when the candidate's backing data
    /// exists; this runs before any teardown.
    pub fn is_valid(&self, id: usize) -> bool {
        self.entries
            .get(id)
            .map(|e| e.manifest.is_file())
            .unwrap_or(false)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CUBE_OBJ: &str = "\
v -1 -1 -1\nv 1 -1 -1\nv 1 1 -1\n\
vn 0 0 -1\n\
f 1//1 2//1 3//1\n";

    fn write_scene(dir: &Path) -> PathBuf {
        let mut obj = File::create(dir.join("tri.obj")).unwrap();
        obj.write_all(CUBE_OBJ.as_bytes()).unwrap();

        let manifest = dir.join("triangle.json");
        let mut file = File::create(&manifest).unwrap();
        file.write_all(
            br#"{
                "camera": { "eye": [0, 1, 5], "look_at": [0, 0, 0] },
                "renderer": { "max_depth": 6, "resolution": [640, 480] },
                "meshes": [
                    {
                        "file": "tri.obj",
                        "albedo": [0.8, 0.2, 0.2],
                        "instances": [
                            { "translation": [0, 0, 0] },
                            { "translation": [2, 0, 0], "scale": 0.5 }
                        ]
                    }
                ],
                "lights": [
                    { "position": [0, 4, 0], "emission": [10, 10, 10] }
                ]
            }"#,
        )
        .unwrap();
        manifest
    }

    #[test]
    fn loads_manifest_meshes_and_instances() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_scene(dir.path());

        let scene = Scene::load(&manifest).unwrap();
        assert_eq!(scene.name, "triangle");
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].vertices.len(), 3);
        assert_eq!(scene.meshes[0].indices.len(), 3);
        assert_eq!(scene.instances.len(), 2);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.options.max_depth, 6);
        assert_eq!(scene.options.resolution, [640, 480]);
        assert!(!scene.use_hdr());
        assert_eq!(scene.hdr_resolution(), 0.0);
    }

    #[test]
    fn missing_manifest_is_scene_not_found() {
        let err = Scene::load(Path::new("/nonexistent/scene.json")).unwrap_err();
        assert!(matches!(err, Error::SceneNotFound(_)));
    }

    #[test]
    fn catalog_discovers_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path());

        let catalog = SceneCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.name(0), "triangle");
        assert!(catalog.is_valid(0));
        assert!(!catalog.is_valid(1));
        assert_eq!(catalog.index_of("triangle"), Some(0));
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = SceneCatalog::discover(Path::new("/nonexistent/assets")).unwrap_err();
        assert!(matches!(err, Error::AssetsRootMissing(_)));
    }
}
