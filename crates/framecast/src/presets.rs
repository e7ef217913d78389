//! Demo filters shipped with the binary.

use compositor::{FilterHandle, ShaderFilter};

pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "grayscale",
        description: "Rec. 709 luma",
        source: r#"
fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let luma = dot(color.rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
    return vec4<f32>(vec3<f32>(luma), color.a);
}
"#,
    },
    Preset {
        name: "sepia",
        description: "warm brown tone",
        source: r#"
fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let r = dot(color.rgb, vec3<f32>(0.393, 0.769, 0.189));
    let g = dot(color.rgb, vec3<f32>(0.349, 0.686, 0.168));
    let b = dot(color.rgb, vec3<f32>(0.272, 0.534, 0.131));
    return vec4<f32>(min(vec3<f32>(r, g, b), vec3<f32>(1.0)), color.a);
}
"#,
    },
    Preset {
        name: "invert",
        description: "negative image",
        source: r#"
fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(vec3<f32>(1.0) - color.rgb, color.a);
}
"#,
    },
    Preset {
        name: "vignette",
        description: "darkened corners",
        source: r#"
fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let offset = uv - vec2<f32>(0.5);
    let falloff = 1.0 - smoothstep(0.3, 0.8, length(offset));
    return vec4<f32>(color.rgb * falloff, color.a);
}
"#,
    },
    Preset {
        name: "pixelate",
        description: "16 pixel blocks",
        source: r#"
fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let block = frame.texel * 16.0;
    let snapped = (floor(uv / block) + vec2<f32>(0.5)) * block;
    return sample_source(snapped);
}
"#,
    },
];

pub fn find(name: &str) -> Option<&'static Preset> {
    let name = name.trim();
    PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|preset| preset.name).collect()
}

impl Preset {
    pub fn handle(&self) -> FilterHandle {
        FilterHandle::new(ShaderFilter::new(self.name, self.source))
    }
}
