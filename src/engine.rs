//! Ties the pieces together: device, registry, pacer, camera and event bus.
//!
//! The engine enforces the ordering the lower layers rely on. Setup records every
//! upload into one transfer pass and blocks until it retires before releasing
//! staging memory. Each rendered frame begins by waiting out the context it is
//! about to reuse, then writes that context's constant generation, then records and
//! submits. Windowing, input, pipelines and presentation stay outside; the frame
//! callback is where an application records its draws.

use glam::Mat4;

use crate::{
    camera::Camera,
    events::EventBus,
    gpu::{CommandBufferId, GpuDevice},
    rendering::{
        constants::{ObjectConstants, PassConstants},
        frame::FramePacer,
        mesh::MeshGeometry,
        resources::Resources,
    },
    QuendaError, QuendaResult,
};

/// Name of the per-pass constant pool the engine creates during setup.
pub const PASS_CONSTANTS: &str = "pass";
/// Name of the per-object constant pool the engine creates during setup.
pub const OBJECT_CONSTANTS: &str = "object";

/// Owns the device and drives the setup / update / render lifecycle.
pub struct Engine<D: GpuDevice> {
    device: D,
    resources: Resources,
    pacer: FramePacer,
    events: EventBus,
    camera: Box<dyn Camera>,
    // Command buffer of the open setup pass, if one is in progress.
    setup_commands: Option<CommandBufferId>,
    pass_constants: PassConstants,
    total_time: f64,
}

impl<D: GpuDevice> Engine<D> {
    /// An engine over `device` drawing at most `max_objects` meshes.
    pub fn new(device: D, camera: Box<dyn Camera>, max_objects: usize) -> QuendaResult<Self> {
        let resources = Resources::new(&device, max_objects);
        let pacer = FramePacer::new(&device)?;
        Ok(Self {
            device,
            resources,
            pacer,
            events: EventBus::new(),
            camera,
            setup_commands: None,
            pass_constants: PassConstants::default(),
            total_time: 0.0,
        })
    }

    /// Open the setup pass and create the standard constant pools: one
    /// [`PassConstants`] record and one [`ObjectConstants`] record per object slot.
    ///
    /// Meshes added before [`Engine::finish_setup`] share a single upload
    /// submission.
    pub fn begin_setup(&mut self) -> QuendaResult<()> {
        if self.setup_commands.is_some() {
            return Err(QuendaError::Other(anyhow::anyhow!(
                "setup pass already in progress"
            )));
        }
        let commands = self.pacer.begin_frame(&self.device)?;
        self.resources.create_constant_pool(
            &self.device,
            PASS_CONSTANTS,
            std::mem::size_of::<PassConstants>(),
            1,
        )?;
        let max_objects = self.resources.max_objects();
        self.resources.create_constant_pool(
            &self.device,
            OBJECT_CONSTANTS,
            std::mem::size_of::<ObjectConstants>(),
            max_objects,
        )?;
        self.setup_commands = Some(commands);
        Ok(())
    }

    /// Submit the setup pass, wait for it to retire and release staging memory.
    pub fn finish_setup(&mut self) -> QuendaResult<()> {
        self.setup_commands
            .take()
            .ok_or_else(|| QuendaError::Other(anyhow::anyhow!("no setup pass in progress")))?;
        let token = self.pacer.end_frame(&self.device)?;
        self.device.wait_for_token(token)?;
        self.resources.release_staging(&self.device);
        log::debug!("setup complete, token {token} retired");
        Ok(())
    }

    /// Upload `geometry` and register it under `name`. Returns its object slot.
    ///
    /// During setup the upload rides the setup pass. Afterwards it gets a dedicated
    /// blocking submission, so mid-run additions are correct but not cheap.
    pub fn add_mesh(&mut self, name: &str, geometry: &MeshGeometry) -> QuendaResult<u32> {
        if let Some(commands) = self.setup_commands {
            return self.resources.add_mesh(&self.device, commands, name, geometry);
        }
        let commands = self.pacer.begin_frame(&self.device)?;
        let slot = self.resources.add_mesh(&self.device, commands, name, geometry)?;
        let token = self.pacer.end_frame(&self.device)?;
        self.device.wait_for_token(token)?;
        self.resources.release_staging(&self.device);
        Ok(slot)
    }

    /// Remove mesh `name`, draining the pipeline first so no in-flight frame still
    /// reads its buffers.
    pub fn remove_mesh(&mut self, name: &str) -> QuendaResult<()> {
        self.pacer.wait_idle(&self.device)?;
        self.resources.remove_mesh(&self.device, name)
    }

    /// Advance simulation time and rebuild the camera's view. The resulting pass
    /// constants are flushed to the GPU by the next [`Engine::render`].
    pub fn update(&mut self, delta_time: f64) {
        self.total_time += delta_time;
        self.camera.update_view();
        self.pass_constants = PassConstants {
            view_proj: self.camera.projection() * self.camera.view(),
            delta_time,
            total_time: self.total_time,
        };
    }

    /// Render one frame.
    ///
    /// Waits until the frame context being reused has retired, writes that
    /// context's pass and object constant generations, hands `record` the open
    /// command buffer to fill with draws, then submits. Returns the frame's token.
    ///
    /// `record` also receives the device, so a recorder can reach backend
    /// specifics like raw buffer handles.
    pub fn render<F>(&mut self, record: F) -> QuendaResult<u64>
    where
        F: FnOnce(&Resources, CommandBufferId, usize, &D),
    {
        let commands = self.pacer.begin_frame(&self.device)?;
        let frame_index = self.pacer.frame_index();

        // Safe to write: begin_frame waited for this context's previous submission.
        self.resources
            .write_constants(frame_index, PASS_CONSTANTS, 0, &self.pass_constants)?;
        let worlds: Vec<(u32, Mat4)> = self
            .resources
            .meshes()
            .map(|(_, mesh)| (mesh.object_slot, Mat4::from(mesh.transform)))
            .collect();
        for (slot, world) in worlds {
            self.resources.write_constants(
                frame_index,
                OBJECT_CONSTANTS,
                slot as usize,
                &ObjectConstants { world },
            )?;
        }

        record(&self.resources, commands, frame_index, &self.device);
        self.pacer.end_frame(&self.device)
    }

    /// Block until every submitted frame has retired.
    pub fn wait_idle(&self) -> QuendaResult<()> {
        self.pacer.wait_idle(&self.device)
    }

    /// The device the engine was built over.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The resource registry.
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Mutable access to the registry, for transform updates between frames.
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// The engine's event bus.
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// The active camera.
    pub fn camera(&self) -> &dyn Camera {
        self.camera.as_ref()
    }

    /// Mutable access to the active camera.
    pub fn camera_mut(&mut self) -> &mut dyn Camera {
        self.camera.as_mut()
    }

    /// Drain the pipeline, destroy every GPU resource and hand back the device.
    pub fn destroy(self) -> QuendaResult<D> {
        self.pacer.wait_idle(&self.device)?;
        self.resources.destroy(&self.device);
        Ok(self.device)
    }
}
