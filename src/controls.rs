// controls.rs — 轨道控制器（拖拽旋转 / 缩放 / 平移）
//
// 相机以 target 为中心、在球坐标系里运动：
//   theta 绕 +Y 轴（水平），phi 从 +Y 轴量起（竖直）。
// 输入只累积增量，真正移动相机在 update() 里完成，每帧调用一次。

use crate::camera::PerspectiveCamera;
use glam::Vec3;
use std::f32::consts::PI;

const EPS: f32 = 0.000_001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    None,
    Rotate { last: [f32; 2] },
    Dolly { last: [f32; 2] },
    Pan { last: [f32; 2] },
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,

    pub no_rotate: bool,
    pub no_zoom: bool,
    pub no_pan: bool,

    pub rotate_speed: f32,
    pub zoom_speed: f32,

    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,

    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,
    // target 被外部修改后，即使没有输入也要让相机重新对准
    dirty: bool,
    drag: DragState,
}

impl OrbitControls {
    pub fn new(camera: &PerspectiveCamera) -> Self {
        Self {
            target: camera.target(),
            no_rotate: false,
            no_zoom: false,
            no_pan: false,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            dirty: true,
            drag: DragState::None,
        }
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.dirty = true;
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    fn dolly_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    pub fn dolly_in(&mut self) {
        if self.no_zoom {
            return;
        }
        self.scale /= self.dolly_scale();
    }

    pub fn dolly_out(&mut self) {
        if self.no_zoom {
            return;
        }
        self.scale *= self.dolly_scale();
    }

    /// 按屏幕像素平移 target；移动距离与相机到 target 的距离和 fov 成正比
    pub fn pan(&mut self, dx: f32, dy: f32, element_height: f32, camera: &PerspectiveCamera) {
        if self.no_pan || element_height <= 0.0 {
            return;
        }
        let offset = camera.position - self.target;
        let target_distance = offset.length() * (camera.fov.to_radians() / 2.0).tan();
        let (right, up) = camera.basis();

        self.pan_offset += right * (-2.0 * dx * target_distance / element_height);
        self.pan_offset += up * (2.0 * dy * target_distance / element_height);
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: [f32; 2]) {
        self.drag = match button {
            PointerButton::Primary if !self.no_rotate => DragState::Rotate { last: position },
            PointerButton::Middle if !self.no_zoom => DragState::Dolly { last: position },
            PointerButton::Secondary if !self.no_pan => DragState::Pan { last: position },
            _ => DragState::None,
        };
    }

    /// element_size 为输入元素（画布）的像素尺寸
    pub fn pointer_move(
        &mut self,
        position: [f32; 2],
        element_size: [f32; 2],
        camera: &PerspectiveCamera,
    ) {
        let [width, height] = element_size;
        match self.drag {
            DragState::None => {}
            DragState::Rotate { last } => {
                if width > 0.0 && height > 0.0 {
                    let dx = position[0] - last[0];
                    let dy = position[1] - last[1];
                    // 横向拖满整个画布 = 转一圈
                    self.rotate_left(2.0 * PI * dx / width * self.rotate_speed);
                    self.rotate_up(2.0 * PI * dy / height * self.rotate_speed);
                }
                self.drag = DragState::Rotate { last: position };
            }
            DragState::Dolly { last } => {
                let dy = position[1] - last[1];
                if dy > 0.0 {
                    self.dolly_in();
                } else if dy < 0.0 {
                    self.dolly_out();
                }
                self.drag = DragState::Dolly { last: position };
            }
            DragState::Pan { last } => {
                self.pan(position[0] - last[0], position[1] - last[1], height, camera);
                self.drag = DragState::Pan { last: position };
            }
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = DragState::None;
    }

    /// delta > 0 为向上滚（远离用户），拉近相机
    pub fn wheel(&mut self, delta: f32) {
        if delta > 0.0 {
            self.dolly_out();
        } else if delta < 0.0 {
            self.dolly_in();
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag != DragState::None
    }

    fn has_pending(&self) -> bool {
        self.dirty
            || self.theta_delta != 0.0
            || self.phi_delta != 0.0
            || self.scale != 1.0
            || self.pan_offset != Vec3::ZERO
    }

    /// 把累积的输入应用到相机上。没有待处理输入时不改动相机，返回 false。
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        if !self.has_pending() {
            return false;
        }

        let offset = camera.position - self.target;

        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.x * offset.x + offset.z * offset.z).sqrt().atan2(offset.y);

        theta += self.theta_delta;
        phi += self.phi_delta;

        phi = phi.clamp(self.min_polar_angle, self.max_polar_angle);
        phi = phi.clamp(EPS, PI - EPS);

        let radius = (offset.length() * self.scale).clamp(self.min_distance, self.max_distance);

        self.target += self.pan_offset;

        let offset = Vec3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );

        camera.position = self.target + offset;
        camera.look_at(self.target);

        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.scale = 1.0;
        self.pan_offset = Vec3::ZERO;
        self.dirty = false;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup() -> (PerspectiveCamera, OrbitControls) {
        let mut camera = PerspectiveCamera::new(95.0, 1.0, 0.001, 700.0);
        camera.position = Vec3::new(100.0, 100.0, 100.0);
        let mut controls = OrbitControls::new(&camera);
        controls.rotate_up(PI / 4.0);
        controls.set_target(camera.position + Vec3::new(0.1, 0.0, 0.0));
        controls.no_zoom = true;
        controls.no_pan = true;
        controls.update(&mut camera);
        (camera, controls)
    }

    #[test]
    fn initial_pitch_offset_is_applied() {
        let (camera, controls) = setup();
        let offset = camera.position - controls.target;
        assert_relative_eq!(offset.length(), 0.1, max_relative = 1e-3);
        // 起始 phi = π/2，rotate_up(π/4) 后变成 π/4
        let phi = (offset.x * offset.x + offset.z * offset.z).sqrt().atan2(offset.y);
        assert_relative_eq!(phi, PI / 4.0, epsilon = 1e-3);
        assert_eq!(camera.target(), controls.target);
    }

    #[test]
    fn idle_frames_do_not_drift() {
        let (mut camera, mut controls) = setup();
        let position = camera.position;
        let view = camera.view_matrix();
        for _ in 0..1000 {
            assert!(!controls.update(&mut camera));
        }
        assert_eq!(camera.position, position);
        assert_eq!(camera.view_matrix(), view);
    }

    #[test]
    fn zoom_is_ignored_when_disabled() {
        let (mut camera, mut controls) = setup();
        let distance = (camera.position - controls.target).length();
        controls.dolly_in();
        controls.wheel(3.0);
        controls.wheel(-3.0);
        controls.pointer_down(PointerButton::Middle, [10.0, 10.0]);
        controls.pointer_move([10.0, 200.0], [800.0, 600.0], &camera);
        controls.update(&mut camera);
        assert_eq!((camera.position - controls.target).length(), distance);
    }

    #[test]
    fn pan_is_ignored_when_disabled() {
        let (mut camera, mut controls) = setup();
        let target = controls.target;
        controls.pan(50.0, 20.0, 600.0, &camera);
        controls.pointer_down(PointerButton::Secondary, [0.0, 0.0]);
        controls.pointer_move([300.0, 100.0], [800.0, 600.0], &camera);
        controls.update(&mut camera);
        assert_eq!(controls.target, target);
    }

    #[test]
    fn zoom_and_pan_work_when_enabled() {
        let (mut camera, mut controls) = setup();
        controls.no_zoom = false;
        controls.no_pan = false;
        let distance = (camera.position - controls.target).length();
        let target = controls.target;

        controls.dolly_out();
        controls.pan(40.0, 0.0, 600.0, &camera);
        assert!(controls.update(&mut camera));

        assert!((camera.position - controls.target).length() < distance);
        assert_ne!(controls.target, target);
    }

    #[test]
    fn wheel_up_moves_camera_closer() {
        let (mut camera, mut controls) = setup();
        controls.no_zoom = false;
        let distance = (camera.position - controls.target).length();

        controls.wheel(1.0);
        assert!(controls.update(&mut camera));
        let closer = (camera.position - controls.target).length();
        assert_relative_eq!(closer, distance * 0.95, max_relative = 1e-3);

        controls.wheel(-1.0);
        assert!(controls.update(&mut camera));
        assert_relative_eq!(
            (camera.position - controls.target).length(),
            distance,
            max_relative = 1e-3
        );
    }

    #[test]
    fn horizontal_drag_rotates_around_target() {
        let (mut camera, mut controls) = setup();
        let before = camera.direction();
        let distance = (camera.position - controls.target).length();

        controls.pointer_down(PointerButton::Primary, [100.0, 300.0]);
        assert!(controls.is_dragging());
        controls.pointer_move([300.0, 300.0], [800.0, 600.0], &camera);
        controls.pointer_up();
        assert!(!controls.is_dragging());
        assert!(controls.update(&mut camera));

        assert_relative_eq!(
            (camera.position - controls.target).length(),
            distance,
            max_relative = 1e-3
        );
        // 拖动 1/4 画布宽 = 转 90°，竖直分量不变
        assert_relative_eq!(camera.direction().y, before.y, epsilon = 1e-3);
        assert_relative_eq!(camera.direction().dot(before), 0.5, epsilon = 1e-2);
    }

    #[test]
    fn vertical_drag_stops_at_pole() {
        let (mut camera, mut controls) = setup();
        controls.rotate_up(10.0);
        controls.update(&mut camera);
        // 相机在 target 正上方，视线朝下，视图矩阵不能出现 NaN
        assert!(camera.position.y > controls.target.y);
        assert_relative_eq!(camera.direction().y, -1.0, epsilon = 1e-3);
        assert!(camera.view_matrix().is_finite());
    }
}
