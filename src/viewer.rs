// viewer.rs — 查看器：场景构建 + 每帧 resize / 控制器更新 / 渲染

use crate::camera::PerspectiveCamera;
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::error::{Result, ViewerError};
use crate::mesh::{mirror_x, Facing, SphereGeometry};
use crate::scene::{CameraId, Mesh, MeshBasicMaterial, MeshId, Scene, VideoTexture};
use crate::video::FrameSlot;
use glam::Vec3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 提供布局尺寸的容器（窗口客户区）
pub trait Container {
    fn layout_size(&self) -> (u32, u32);
}

/// 渲染输出表面
pub trait RenderTarget {
    fn size(&self) -> (u32, u32);
    fn set_size(&mut self, width: u32, height: u32);
    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera, hud: &Hud) -> Result<()>;
}

/// "请求下一帧" 的能力
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Rendered,
    Stopped,
}

/// 状态栏显示的数据
#[derive(Debug, Clone, Default)]
pub struct Hud {
    pub visible: bool,
    pub fps: f32,
    pub frame_generation: u64,
    pub yaw: f32,
    pub pitch: f32,
    pub source: Option<String>,
}

struct FpsCounter {
    since: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            since: Instant::now(),
            frames: 0,
        }
    }

    fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frames as f32 / elapsed;
            self.frames = 0;
            self.since = Instant::now();
            Some(fps)
        } else {
            None
        }
    }
}

pub struct Viewer<R, C> {
    renderer: R,
    container: C,
    scene: Scene,
    camera: CameraId,
    sphere: MeshId,
    pub controls: OrbitControls,
    pub hud: Hud,
    frames: FrameSlot,
    stop: StopToken,
    fps: FpsCounter,
}

impl<R: RenderTarget, C: Container> Viewer<R, C> {
    /// 构建顺序：renderer（由调用方创建）→ scene → 球体 → 相机 → 控制器。
    /// 渲染表面的尺寸在最后的 resize() 中按容器设定。
    pub fn new(config: &ViewerConfig, renderer: R, container: C, frames: FrameSlot) -> Self {
        let mut scene = Scene::new();

        let sphere_cfg = &config.sphere;
        let mut geometry =
            SphereGeometry::new(sphere_cfg.radius, sphere_cfg.width_segments, sphere_cfg.height_segments);
        // 镜像一次，让内表面朝向球心
        geometry.apply_matrix(mirror_x());
        debug_assert_eq!(geometry.facing(), Facing::Inward);

        let mut texture = VideoTexture::new(frames.clone());
        texture.mag_filter = config.playback.mag_filter;
        let material = MeshBasicMaterial { map: Some(texture) };
        let sphere = scene.add_mesh(Mesh::new(geometry, material));

        let cam_cfg = &config.camera;
        let mut camera = PerspectiveCamera::new(cam_cfg.fov, 1.0, cam_cfg.near, cam_cfg.far);
        camera.position = Vec3::from(cam_cfg.position);

        let ctl_cfg = &config.controls;
        let mut controls = OrbitControls::new(&camera);
        controls.rotate_up(ctl_cfg.initial_pitch);
        controls.set_target(camera.position + Vec3::from(ctl_cfg.target_offset));
        controls.rotate_speed = ctl_cfg.rotate_speed;
        controls.zoom_speed = ctl_cfg.zoom_speed;
        controls.no_zoom = !ctl_cfg.enable_zoom;
        controls.no_pan = !ctl_cfg.enable_pan;

        let camera = scene.add_camera(camera);

        log::debug!(
            "scene ready: {} objects, sphere r={} ({} triangles), camera fov={} near={} far={}",
            scene.len(),
            sphere_cfg.radius,
            scene.mesh(sphere).geometry.triangle_count(),
            cam_cfg.fov,
            cam_cfg.near,
            cam_cfg.far
        );

        let hud = Hud {
            visible: config.show_hud,
            source: config
                .playback
                .source
                .as_ref()
                .map(|p| p.display().to_string()),
            ..Hud::default()
        };

        let mut viewer = Self {
            renderer,
            container,
            scene,
            camera,
            sphere,
            controls,
            hud,
            frames,
            stop: StopToken::default(),
            fps: FpsCounter::new(),
        };
        viewer.resize();
        viewer
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        self.scene.camera(self.camera)
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// 按容器当前尺寸更新相机宽高比和渲染表面。尺寸为 0（窗口最小化）时保持原状。
    pub fn resize(&mut self) {
        let (width, height) = self.container.layout_size();
        if width == 0 || height == 0 {
            return;
        }

        let camera = self.scene.camera_mut(self.camera);
        camera.aspect = width as f32 / height as f32;
        camera.update_projection_matrix();

        self.renderer.set_size(width, height);
    }

    pub fn update(&mut self) {
        self.resize();
        self.controls.update(self.scene.camera_mut(self.camera));
    }

    pub fn render(&mut self) -> Result<()> {
        self.refresh_hud();
        let camera = self.scene.camera(self.camera);
        self.renderer.render(&self.scene, camera, &self.hud)
    }

    /// 一帧：先预约下一帧，再 update + render。停止后不再预约。
    pub fn animate(&mut self, scheduler: &mut impl FrameScheduler) -> Result<Frame> {
        if self.stop.is_stopped() {
            return Ok(Frame::Stopped);
        }
        scheduler.request_frame();

        self.update();
        match self.render() {
            Ok(()) => {}
            Err(ViewerError::OutOfMemory) => {
                self.stop.stop();
                return Err(ViewerError::OutOfMemory);
            }
            Err(e) => log::error!("render error: {e}"),
        }

        if let Some(fps) = self.fps.tick() {
            self.hud.fps = fps;
        }
        Ok(Frame::Rendered)
    }

    fn refresh_hud(&mut self) {
        let dir = self.camera().direction();
        self.hud.yaw = dir.x.atan2(-dir.z).to_degrees();
        self.hud.pitch = dir.y.clamp(-1.0, 1.0).asin().to_degrees();
        self.hud.frame_generation = self.frames.generation();
    }
}
