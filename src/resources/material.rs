//! Material definitions for PBR rendering

/// Stable id of a texture in the scene's texture registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Which map a material texture feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialSlot {
    Albedo,
    Normal,
    Metallic,
    Roughness,
    AmbientOcclusion,
}

impl MaterialSlot {
    pub const ALL: [MaterialSlot; 5] = [
        MaterialSlot::Albedo,
        MaterialSlot::Normal,
        MaterialSlot::Metallic,
        MaterialSlot::Roughness,
        MaterialSlot::AmbientOcclusion,
    ];

    /// Texture unit the shading pass binds this slot to
    pub fn unit(&self) -> u32 {
        match self {
            MaterialSlot::Albedo => 3,
            MaterialSlot::Normal => 4,
            MaterialSlot::Metallic => 5,
            MaterialSlot::Roughness => 6,
            MaterialSlot::AmbientOcclusion => 7,
        }
    }

    /// Sampler uniform name in the PBR program
    pub fn uniform(&self) -> &'static str {
        match self {
            MaterialSlot::Albedo => "material.albedo",
            MaterialSlot::Normal => "material.normal",
            MaterialSlot::Metallic => "material.metallic",
            MaterialSlot::Roughness => "material.roughness",
            MaterialSlot::AmbientOcclusion => "material.ao",
        }
    }
}

/// Five texture slots of a metallic-roughness material.
///
/// Empty slots fall back to the scene's default maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbrMaterial {
    pub name: String,
    pub albedo: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub metallic: Option<TextureId>,
    pub roughness: Option<TextureId>,
    pub ao: Option<TextureId>,
}

impl PbrMaterial {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, texture: TextureId) -> Self {
        self.albedo = Some(texture);
        self
    }

    pub fn with_normal(mut self, texture: TextureId) -> Self {
        self.normal = Some(texture);
        self
    }

    pub fn with_metallic(mut self, texture: TextureId) -> Self {
        self.metallic = Some(texture);
        self
    }

    pub fn with_roughness(mut self, texture: TextureId) -> Self {
        self.roughness = Some(texture);
        self
    }

    pub fn with_ao(mut self, texture: TextureId) -> Self {
        self.ao = Some(texture);
        self
    }

    pub fn slot(&self, slot: MaterialSlot) -> Option<TextureId> {
        match slot {
            MaterialSlot::Albedo => self.albedo,
            MaterialSlot::Normal => self.normal,
            MaterialSlot::Metallic => self.metallic,
            MaterialSlot::Roughness => self.roughness,
            MaterialSlot::AmbientOcclusion => self.ao,
        }
    }

    pub fn set_slot(&mut self, slot: MaterialSlot, texture: Option<TextureId>) {
        match slot {
            MaterialSlot::Albedo => self.albedo = texture,
            MaterialSlot::Normal => self.normal = texture,
            MaterialSlot::Metallic => self.metallic = texture,
            MaterialSlot::Roughness => self.roughness = texture,
            MaterialSlot::AmbientOcclusion => self.ao = texture,
        }
    }
}
