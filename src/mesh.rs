// mesh.rs — 球面网格生成
//
// 经纬球：x = -r·cosφ·sinθ, y = r·cosθ, z = r·sinφ·sinθ，三角形逆时针朝外。
// 视频要贴在球内侧，所以生成后再沿一个轴做一次负缩放（apply_matrix）。

use glam::{Mat3, Mat4, Vec3};

/// 单方向分段数上限；(1024 + 1)² 个顶点远在 u32 索引范围内
pub const MAX_SEGMENTS: u32 = 1024;

/// 三角形绕序相对球心的朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Outward,
    Inward,
}

#[derive(Debug, Clone)]
pub struct SphereGeometry {
    pub radius: f32,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl SphereGeometry {
    pub fn new(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let lon = width_segments.clamp(3, MAX_SEGMENTS) as usize;
        let lat = height_segments.clamp(2, MAX_SEGMENTS) as usize;

        let mut positions = Vec::with_capacity((lat + 1) * (lon + 1));
        let mut normals = Vec::with_capacity((lat + 1) * (lon + 1));
        let mut uvs = Vec::with_capacity((lat + 1) * (lon + 1));
        let mut indices = Vec::with_capacity(lat * lon * 6);

        for i in 0..=lat {
            let v = i as f32 / lat as f32;
            let theta = std::f32::consts::PI * v;
            let sin_t = theta.sin();
            let cos_t = theta.cos();

            for j in 0..=lon {
                let u = j as f32 / lon as f32;
                let phi = 2.0 * std::f32::consts::PI * u;

                let n = Vec3::new(-phi.cos() * sin_t, cos_t, phi.sin() * sin_t);
                positions.push((n * radius).to_array());
                normals.push(n.to_array());
                // wgpu 纹理 v=0 在图像顶部，正好对应北极
                uvs.push([u, v]);
            }
        }

        for i in 0..lat {
            for j in 0..lon {
                let a = (i * (lon + 1) + j) as u32;
                let b = a + (lon + 1) as u32;

                // 两极处的三角形退化为线段，直接跳过
                if i != 0 {
                    indices.extend_from_slice(&[a, b, a + 1]);
                }
                if i != lat - 1 {
                    indices.extend_from_slice(&[b, b + 1, a + 1]);
                }
            }
        }

        Self {
            radius,
            positions,
            normals,
            uvs,
            indices,
        }
    }

    /// 对几何体本身应用变换。
    /// 法线用逆转置矩阵变换；绕序不变，所以镜像后可见面随之翻转。
    pub fn apply_matrix(&mut self, m: Mat4) {
        let normal_matrix = Mat3::from_mat4(m).inverse().transpose();
        for p in &mut self.positions {
            *p = m.transform_point3(Vec3::from(*p)).to_array();
        }
        for n in &mut self.normals {
            *n = (normal_matrix * Vec3::from(*n)).normalize_or_zero().to_array();
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// 用有向体积判断绕序朝向：闭合网格朝外时体积为正。
    pub fn facing(&self) -> Facing {
        let volume: f64 = self
            .indices
            .chunks_exact(3)
            .map(|tri| {
                let p0 = Vec3::from(self.positions[tri[0] as usize]).as_dvec3();
                let p1 = Vec3::from(self.positions[tri[1] as usize]).as_dvec3();
                let p2 = Vec3::from(self.positions[tri[2] as usize]).as_dvec3();
                p0.dot(p1.cross(p2))
            })
            .sum();

        if volume >= 0.0 {
            Facing::Outward
        } else {
            Facing::Inward
        }
    }
}

/// 沿 X 轴镜像的缩放矩阵
pub fn mirror_x() -> Mat4 {
    Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0))
}
