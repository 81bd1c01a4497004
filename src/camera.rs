use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

#[inline]
fn deg2rad(deg: f32) -> f32 {
    deg * std::f32::consts::PI / 180.0
}

// vectors giving the current perception of the camera
#[derive(Clone, Debug)]
struct DirVecs {
    // NOTE: front is actually backwards
    front: Vector3<f32>,
    #[allow(dead_code)]
    right: Vector3<f32>,
    #[allow(dead_code)]
    up: Vector3<f32>,
}

impl DirVecs {
    fn new(worldup: Vector3<f32>, pitch: f32, yaw: f32) -> DirVecs {
        let front = Vector3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();
        // get other vectors
        let right = front.cross(&worldup).normalize();
        let up = right.cross(&front).normalize();
        // return values
        DirVecs { front, right, up }
    }
}

fn gen_perspective_projection(extent: [u32; 2]) -> Matrix4<f32> {
    let [screen_x, screen_y] = extent;
    let aspect_ratio = screen_x as f32 / screen_y as f32;
    let fov = deg2rad(90.0);
    let near = 0.1;
    let far = 100.0;
    Matrix4::new_perspective(aspect_ratio, fov, near, far)
}

pub trait Camera {
    fn mvp(&self, extent: [u32; 2]) -> Matrix4<f32>;
    fn set_position(&mut self, pos: Point3<f32>);
    fn set_rotation(&mut self, rot: UnitQuaternion<f32>);
}

// lets you orbit around the central point
pub struct SphericalCamera {
    // position of the camera's root point
    root_pos: Point3<f32>,
    // rotation of the camera's root point
    root_rot: UnitQuaternion<f32>,
    // world up
    worldup: Vector3<f32>,
    // offset from the root position
    offset: f32,
    // pitch
    pitch: f32,
    // yaw
    yaw: f32,
}

impl SphericalCamera {
    pub fn new() -> SphericalCamera {
        SphericalCamera {
            root_pos: Point3::default(),
            root_rot: UnitQuaternion::identity(),
            worldup: Vector3::new(0.0, -1.0, 0.0),
            pitch: 0.0,
            yaw: 0.0,
            offset: 3.0,
        }
    }

    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw -= delta_yaw;
        self.pitch -= delta_pitch;

        if self.pitch > deg2rad(89.0) {
            self.pitch = deg2rad(89.0);
        } else if self.pitch < -deg2rad(89.0) {
            self.pitch = -deg2rad(89.0);
        }
    }

    pub fn zoom(&mut self, delta: f32) {
        self.offset -= delta;
        if self.offset < 0.5 {
            self.offset = 0.5;
        }
    }
}

impl Default for SphericalCamera {
    fn default() -> SphericalCamera {
        SphericalCamera::new()
    }
}

impl Camera for SphericalCamera {
    fn mvp(&self, extent: [u32; 2]) -> Matrix4<f32> {
        let dirs = DirVecs::new(self.worldup, self.pitch, self.yaw);
        let projection = gen_perspective_projection(extent);
        let view = Matrix4::look_at_rh(
            &(self.root_pos - self.offset * (self.root_rot * dirs.front)),
            &self.root_pos,
            &self.worldup,
        );
        projection * view
    }

    fn set_position(&mut self, pos: Point3<f32>) {
        self.root_pos = pos;
    }

    fn set_rotation(&mut self, rot: UnitQuaternion<f32>) {
        self.root_rot = rot;
    }
}
