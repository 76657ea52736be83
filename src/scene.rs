// scene.rs — 场景图：相机 + 贴视频纹理的球体

use crate::camera::PerspectiveCamera;
use crate::mesh::SphereGeometry;
use crate::video::FrameSlot;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// 从正在播放的视频源采样的纹理。只持有帧槽位的句柄，不拥有视频源。
#[derive(Debug, Clone)]
pub struct VideoTexture {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    frames: FrameSlot,
}

impl VideoTexture {
    pub fn new(frames: FrameSlot) -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            frames,
        }
    }

    pub fn frames(&self) -> &FrameSlot {
        &self.frames
    }
}

/// 不受光照影响的材质，直接输出贴图颜色
#[derive(Debug, Clone, Default)]
pub struct MeshBasicMaterial {
    pub map: Option<VideoTexture>,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: SphereGeometry,
    pub material: MeshBasicMaterial,
}

impl Mesh {
    pub fn new(geometry: SphereGeometry, material: MeshBasicMaterial) -> Self {
        Self { geometry, material }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(usize);

/// 场景独占其中的相机和网格；对象创建后不会被移除，所以 id 始终有效。
#[derive(Debug, Default)]
pub struct Scene {
    cameras: Vec<PerspectiveCamera>,
    meshes: Vec<Mesh>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_camera(&mut self, camera: PerspectiveCamera) -> CameraId {
        self.cameras.push(camera);
        CameraId(self.cameras.len() - 1)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.cameras.len() + self.meshes.len()
    }

    pub fn camera(&self, id: CameraId) -> &PerspectiveCamera {
        &self.cameras[id.0]
    }

    pub fn camera_mut(&mut self, id: CameraId) -> &mut PerspectiveCamera {
        &mut self.cameras[id.0]
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> + '_ {
        self.meshes.iter().enumerate().map(|(i, m)| (MeshId(i), m))
    }
}
