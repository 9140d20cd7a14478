//! Frame description and surface identities.

/// Size and formats of the frame the pass runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Depth attachment of the host's frame, if any.
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            depth_format: None,
        }
    }

    pub fn with_depth(mut self, depth_format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(depth_format);
        self
    }

    /// The same descriptor with the depth channel stripped.
    pub fn color_only(&self) -> Self {
        Self {
            depth_format: None,
            ..*self
        }
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width.max(1),
            height: self.height.max(1),
            depth_or_array_layers: 1,
        }
    }
}

/// Everything the host hands the pass for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    pub descriptor: FrameDescriptor,
    /// Unscaled elapsed time in seconds.
    pub time: f32,
    /// Elapsed time with the host's time scale applied.
    pub scaled_time: f32,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl FrameContext {
    /// A context whose screen matches the frame and whose time is unscaled.
    pub fn new(descriptor: FrameDescriptor, time: f32) -> Self {
        Self {
            descriptor,
            time,
            scaled_time: time,
            screen_width: descriptor.width,
            screen_height: descriptor.height,
        }
    }

    pub fn with_scaled_time(mut self, scaled_time: f32) -> Self {
        self.scaled_time = scaled_time;
        self
    }

    pub fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen_width = width;
        self.screen_height = height;
        self
    }
}

/// One of the two per-frame temporaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index % 2 == 0 {
            Slot::A
        } else {
            Slot::B
        }
    }

    /// The slot a step writes when this one holds the latest image.
    pub fn other(self) -> Self {
        Slot::from_index(1 - self.index())
    }
}

/// A surface the chain can read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    /// The host's primary frame target.
    Target,
    Temp(Slot),
}
