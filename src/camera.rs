// camera.rs — 透视相机

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// 垂直视场角（度）
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub up: Vec3,
    look_target: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: Vec3::ZERO,
            up: Vec3::Y,
            look_target: Vec3::NEG_Z,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    /// 修改 fov/aspect/near/far 之后必须调用，否则投影矩阵仍是旧值
    pub fn update_projection_matrix(&mut self) {
        // wgpu 的深度范围是 0..1
        self.projection = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.look_target = target;
    }

    pub fn target(&self) -> Vec3 {
        self.look_target
    }

    /// 视线方向（单位向量）
    pub fn direction(&self) -> Vec3 {
        let dir = (self.look_target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            dir
        }
    }

    // 视线与 up 平行时（看正上/正下方）换一个参考轴，避免叉积为零
    fn reference_up(&self, forward: Vec3) -> Vec3 {
        if forward.cross(self.up).length_squared() < 1e-10 {
            Vec3::Z
        } else {
            self.up
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.direction();
        Mat4::look_to_rh(self.position, forward, self.reference_up(forward))
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// 相机坐标系的右方向与上方向
    pub fn basis(&self) -> (Vec3, Vec3) {
        let forward = self.direction();
        let right = forward.cross(self.reference_up(forward)).normalize();
        let up = right.cross(forward);
        (right, up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aspect_change_needs_projection_refresh() {
        let mut camera = PerspectiveCamera::new(95.0, 1.0, 0.001, 700.0);
        let before = camera.projection_matrix();

        camera.aspect = 2.0;
        assert_eq!(camera.projection_matrix(), before);

        camera.update_projection_matrix();
        let after = camera.projection_matrix();
        assert_ne!(after, before);
        // x 缩放 = 1 / (tan(fov/2) * aspect)
        let f = 1.0 / (95f32.to_radians() / 2.0).tan();
        assert_relative_eq!(after.x_axis.x, f / 2.0, max_relative = 1e-5);
        assert_relative_eq!(after.y_axis.y, f, max_relative = 1e-5);
    }

    #[test]
    fn points_between_clip_planes_stay_in_depth_range() {
        let mut camera = PerspectiveCamera::new(95.0, 4.0 / 3.0, 0.001, 700.0);
        camera.position = Vec3::new(100.0, 100.0, 100.0);
        camera.look_at(Vec3::new(100.1, 100.0, 100.0));

        // 球面上离相机最远的点距离 500 + |position|，必须落在远裁剪面内
        let far_point = camera.position + camera.direction() * (500.0 + camera.position.length() - 1.0);
        let clip = camera.view_projection() * far_point.extend(1.0);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0, "depth = {depth}");
    }

    #[test]
    fn basis_is_orthonormal() {
        let mut camera = PerspectiveCamera::new(60.0, 1.0, 0.1, 10.0);
        camera.position = Vec3::ZERO;
        camera.look_at(Vec3::new(1.0, 1.0, 0.0));
        let (right, up) = camera.basis();
        assert_relative_eq!(right.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(up.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(right.dot(up), 0.0, epsilon = 1e-5);
        assert_relative_eq!(right.dot(camera.direction()), 0.0, epsilon = 1e-5);
    }
}
