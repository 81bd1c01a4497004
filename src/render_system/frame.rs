//! Frame submission pipeline.
//!
//! Frames are recorded onto a single-worker queue so they retire in
//! submission order, and a counting gate caps how many may be in flight at
//! once. The caller gets a [`FrameHandle`] per submission and may keep
//! submitting while earlier frames still render.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use image::RgbImage;
use nalgebra::{Matrix4, Vector2};
use rayon::prelude::*;
use threadpool::ThreadPool;

use crate::error::RenderError;
use crate::render_system::accel::{AccelerationStructure, Intersection};
use crate::render_system::accumulate::AccumulationImage;
use crate::render_system::ray::{generate_camera_ray, Ray};
use crate::render_system::scene::SceneGeometry;
use crate::render_system::shade::shade_ray;

#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    pub extent: [u32; 2],
    /// Surface interactions per path before the frame retires it.
    pub max_bounces: u32,
    /// Frames that may be submitted before `submit_frame` blocks.
    pub frames_in_flight: usize,
}

impl Default for RenderConfig {
    fn default() -> RenderConfig {
        RenderConfig {
            extent: [1280, 720],
            max_bounces: 4,
            frames_in_flight: 3,
        }
    }
}

/// Constants captured at submission time. A frame renders against the camera
/// and counters it was submitted with, regardless of what the caller mutates
/// afterwards.
#[derive(Clone, Copy, Debug)]
pub struct ApplicationData {
    pub view_projection: Matrix4<f32>,
    pub inv_view_projection: Matrix4<f32>,
    pub frame_index: u32,
    pub emitter_count: u32,
    /// Sub-pixel jitter applied to every primary ray this frame.
    pub frame_offset: Vector2<f32>,
}

/// Counting gate over frame slots. `acquire` blocks when every slot is taken
/// and wakes when a finished frame releases one.
struct Semaphore {
    slots: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(slots: usize) -> Semaphore {
        Semaphore {
            slots: Mutex::new(slots),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut slots = self.slots.lock().unwrap();
        while *slots == 0 {
            slots = self.available.wait(slots).unwrap();
        }
        *slots -= 1;
    }

    fn release(&self) {
        *self.slots.lock().unwrap() += 1;
        self.available.notify_one();
    }
}

/// Completion token for one submitted frame.
pub struct FrameHandle {
    completion: mpsc::Receiver<Result<(), RenderError>>,
}

impl FrameHandle {
    /// Blocks until the frame has been folded into the accumulation target.
    pub fn wait(self) -> Result<(), RenderError> {
        self.completion.recv().map_err(|_| RenderError::QueueClosed)?
    }
}

/// Per-pixel working buffers reused across frames. Reallocation only happens
/// when the output extent changes.
struct FrameResources {
    rays: Vec<Ray>,
    intersections: Vec<Intersection>,
}

impl FrameResources {
    fn allocate(pixels: usize) -> Result<FrameResources, RenderError> {
        let mut resources = FrameResources {
            rays: Vec::new(),
            intersections: Vec::new(),
        };
        resources.reallocate(pixels)?;
        Ok(resources)
    }

    fn reallocate(&mut self, pixels: usize) -> Result<(), RenderError> {
        if self.rays.len() == pixels {
            return Ok(());
        }
        self.rays.clear();
        self.rays
            .try_reserve_exact(pixels)
            .map_err(|_| RenderError::BufferAllocation { pixels })?;
        self.rays.resize(pixels, Ray::terminated());

        self.intersections.clear();
        self.intersections
            .try_reserve_exact(pixels)
            .map_err(|_| RenderError::BufferAllocation { pixels })?;
        self.intersections.resize(pixels, Intersection::miss());
        Ok(())
    }
}

/// Owns the frame queue, the in-flight gate, the working buffers and the
/// accumulation target.
pub struct Renderer {
    queue: ThreadPool,
    gate: Arc<Semaphore>,
    resources: Arc<Mutex<FrameResources>>,
    target: Arc<Mutex<AccumulationImage>>,
    scene: Arc<SceneGeometry>,
    accel: Arc<dyn AccelerationStructure>,
    config: RenderConfig,
    frame_index: u32,
}

impl Renderer {
    pub fn new(
        scene: Arc<SceneGeometry>,
        accel: Arc<dyn AccelerationStructure>,
        config: RenderConfig,
    ) -> Result<Renderer, RenderError> {
        let pixels = config.extent[0] as usize * config.extent[1] as usize;
        Ok(Renderer {
            queue: ThreadPool::new(1),
            gate: Arc::new(Semaphore::new(config.frames_in_flight.max(1))),
            resources: Arc::new(Mutex::new(FrameResources::allocate(pixels)?)),
            target: Arc::new(Mutex::new(AccumulationImage::new(config.extent)?)),
            scene,
            accel,
            config,
            frame_index: 0,
        })
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn extent(&self) -> [u32; 2] {
        self.config.extent
    }

    /// Records one frame onto the queue. Blocks only when the configured
    /// number of frames is already in flight, otherwise returns as soon as
    /// the frame is recorded.
    pub fn submit_frame(&mut self, view_projection: Matrix4<f32>) -> Result<FrameHandle, RenderError> {
        let inv_view_projection = view_projection
            .try_inverse()
            .ok_or(RenderError::SingularViewProjection)?;
        let data = ApplicationData {
            view_projection,
            inv_view_projection,
            frame_index: self.frame_index,
            emitter_count: self.scene.emitter_count(),
            frame_offset: Vector2::zeros(),
        };

        self.gate.acquire();

        let (sender, receiver) = mpsc::channel();
        let gate = self.gate.clone();
        let resources = self.resources.clone();
        let target = self.target.clone();
        let scene = self.scene.clone();
        let accel = self.accel.clone();
        let extent = self.config.extent;
        let max_bounces = self.config.max_bounces;
        self.queue.execute(move || {
            let result = render_frame(
                &resources,
                &target,
                &scene,
                accel.as_ref(),
                data,
                extent,
                max_bounces,
            );
            gate.release();
            if sender.send(result).is_err() {
                log::warn!("frame {} finished but its handle was dropped", data.frame_index);
            }
        });

        self.frame_index += 1;
        Ok(FrameHandle { completion: receiver })
    }

    /// Drains the queue, swaps the working buffers and the target to the new
    /// extent and restarts accumulation from frame zero.
    pub fn resize(&mut self, extent: [u32; 2]) -> Result<(), RenderError> {
        self.wait_idle();
        let pixels = extent[0] as usize * extent[1] as usize;
        self.resources.lock().unwrap().reallocate(pixels)?;
        self.target.lock().unwrap().resize(extent)?;
        self.config.extent = extent;
        self.frame_index = 0;
        log::debug!("render target resized to {}x{}", extent[0], extent[1]);
        Ok(())
    }

    /// Restarts accumulation after a camera or scene change.
    pub fn reset(&mut self) {
        self.wait_idle();
        self.target.lock().unwrap().clear();
        self.frame_index = 0;
    }

    /// Blocks until every submitted frame has retired.
    pub fn wait_idle(&self) {
        self.queue.join();
    }

    pub fn snapshot_rgb(&self) -> RgbImage {
        self.target.lock().unwrap().to_rgb_image()
    }

    pub fn target(&self) -> Arc<Mutex<AccumulationImage>> {
        self.target.clone()
    }
}

/// Executes one full frame: primary ray generation, the bounce loop, and the
/// blend into the accumulation target.
fn render_frame(
    resources: &Mutex<FrameResources>,
    target: &Mutex<AccumulationImage>,
    scene: &SceneGeometry,
    accel: &dyn AccelerationStructure,
    data: ApplicationData,
    extent: [u32; 2],
    max_bounces: u32,
) -> Result<(), RenderError> {
    let pixels = extent[0] as usize * extent[1] as usize;
    let mut resources = resources.lock().unwrap();
    resources.reallocate(pixels)?;
    let FrameResources { rays, intersections } = &mut *resources;

    rays.par_iter_mut().enumerate().for_each(|(i, ray)| {
        let pixel = [i as u32 % extent[0], i as u32 / extent[0]];
        *ray = generate_camera_ray(&data.inv_view_projection, pixel, data.frame_offset, extent);
    });

    for _ in 0..max_bounces {
        accel.intersect(rays, intersections);
        rays.par_iter_mut()
            .zip(intersections.par_iter())
            .enumerate()
            .for_each(|(i, (ray, hit))| {
                let pixel = [i as u32 % extent[0], i as u32 / extent[0]];
                shade_ray(ray, hit, scene, pixel, data.frame_index);
            });
    }

    let mut target = target.lock().unwrap();
    if target.extent() != extent {
        target.resize(extent)?;
    }
    target.accumulate(rays, data.frame_index);
    Ok(())
}
