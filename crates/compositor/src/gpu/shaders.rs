/// Samples the source through the per-draw transform and crop. Used for the
/// camera input pass and for every destination blit.
pub(crate) const BLIT_SHADER: &str = r#"
struct Blit {
    inverse: vec4<f32>,
    crop: vec4<f32>,
    options: vec4<f32>,
};

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> blit: Blit;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let clip = corner * 2.0 - 1.0;
    let full = blit.crop.xy + clip * blit.crop.zw;
    let source = vec2<f32>(
        blit.inverse.x * full.x + blit.inverse.y * full.y,
        blit.inverse.z * full.x + blit.inverse.w * full.y,
    );
    var out: VertexOutput;
    out.position = vec4<f32>(clip, 0.0, 1.0);
    out.uv = vec2<f32>(source.x * 0.5 + 0.5, 0.5 - source.y * 0.5);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if (blit.options.x > 0.5) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    return textureSampleLevel(source_texture, source_sampler, in.uv, 0.0);
}
"#;

/// Declarations every filter is compiled against. The filter body supplies
/// `apply_filter`.
const FILTER_PRELUDE: &str = r#"
struct Frame {
    resolution: vec2<f32>,
    texel: vec2<f32>,
};

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> frame: Frame;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let clip = corner * 2.0 - 1.0;
    var out: VertexOutput;
    out.position = vec4<f32>(clip, 0.0, 1.0);
    out.uv = vec2<f32>(clip.x * 0.5 + 0.5, 0.5 - clip.y * 0.5);
    return out;
}

fn sample_source(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(source_texture, source_sampler, uv, 0.0);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return apply_filter(sample_source(in.uv), in.uv);
}
"#;

/// Edge smoothing run after the filter chain when anti-aliasing is on.
pub(crate) const ANTIALIAS_FILTER: &str = r#"
fn luma(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.299, 0.587, 0.114));
}

fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let t = frame.texel;
    let north = sample_source(uv + vec2<f32>(0.0, -t.y));
    let south = sample_source(uv + vec2<f32>(0.0, t.y));
    let east = sample_source(uv + vec2<f32>(t.x, 0.0));
    let west = sample_source(uv + vec2<f32>(-t.x, 0.0));

    let center = luma(color.rgb);
    let ln = luma(north.rgb);
    let ls = luma(south.rgb);
    let le = luma(east.rgb);
    let lw = luma(west.rgb);
    let high = max(max(max(ln, ls), max(le, lw)), center);
    let low = min(min(min(ln, ls), min(le, lw)), center);
    let contrast = high - low;
    if (contrast < 0.0625) {
        return color;
    }

    let average = (north + south + east + west) * 0.25;
    let weight = clamp(contrast * 2.0, 0.0, 0.5);
    return vec4<f32>(mix(color.rgb, average.rgb, weight), color.a);
}
"#;

/// Wraps a filter body with [`FILTER_PRELUDE`].
pub(crate) fn wrap_filter_source(body: &str) -> String {
    let mut wrapped = String::with_capacity(FILTER_PRELUDE.len() + body.len() + 1);
    wrapped.push_str(FILTER_PRELUDE);
    wrapped.push('\n');
    wrapped.push_str(body);
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_filter_keeps_body_after_prelude() {
        let body = "fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> { return color; }";
        let wrapped = wrap_filter_source(body);
        assert!(wrapped.starts_with(FILTER_PRELUDE));
        assert!(wrapped.ends_with(body));
        assert!(wrapped.contains("fn fs_main"));
    }

    #[test]
    fn builtin_shaders_parse() {
        wgpu::naga::front::wgsl::parse_str(BLIT_SHADER).expect("blit shader");
        wgpu::naga::front::wgsl::parse_str(&wrap_filter_source(ANTIALIAS_FILTER))
            .expect("antialias shader");
    }
}
