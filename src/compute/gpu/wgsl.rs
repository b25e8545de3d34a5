//! WGSL generation from a pass's named-input table.
//!
//! The caller writes only `fn compute_cell(cell: vec2<i32>) -> vec4<f32>`.
//! Bindings, the parameter block, and the per-input load helpers are
//! generated from the [`PassLayout`], then the entry point is appended.
//!
//! Binding 0 is the parameter block, bindings `1..=n` are the surface inputs
//! in layout order, and binding `n + 1` is the output surface.
//!
//! Input names never appear bare at module scope. Textures are bound as
//! `in_<name>` and only the `load_`/`sample_` helpers use the caller's name,
//! so no input can shadow a builtin or another input's helper.

use std::fmt::Write;

use crate::compute::PassLayout;
use crate::schema::{GridSize, InputKind, UniformValue};

/// Workgroup edge length for every generated pass.
pub const WORKGROUP_SIZE: u32 = 8;

/// Function every WGSL program must define.
pub const CELL_FUNCTION: &str = "compute_cell";

/// Module-scope texture binding for an input.
#[inline]
pub fn binding_name(input: &str) -> String {
    format!("in_{}", input)
}

/// Whether a program body defines the cell function.
pub fn defines_cell_function(body: &str) -> bool {
    body.match_indices("fn").any(|(i, _)| {
        let before_ok = body[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_');
        let rest = body[i + 2..].trim_start();
        before_ok
            && rest.starts_with(CELL_FUNCTION)
            && rest[CELL_FUNCTION.len()..]
                .trim_start()
                .starts_with('(')
    })
}

/// Binding index of the output surface.
#[inline]
pub fn output_binding(layout: &PassLayout) -> u32 {
    layout.surfaces.len() as u32 + 1
}

/// Full shader source for a program bound to a layout.
pub fn assemble(layout: &PassLayout, body: &str) -> String {
    let mut src = String::new();

    src.push_str("struct PassParams {\n");
    src.push_str("    resolution: vec2<f32>,\n");
    src.push_str("    _pad0: vec2<f32>,\n");
    for (i, decl) in layout.uniforms.iter().enumerate() {
        // Each uniform occupies one 16-byte slot; padding is named by slot.
        let slot = i + 1;
        match decl.kind() {
            InputKind::Vec2 => {
                let _ = writeln!(src, "    {}: vec2<f32>,", decl.name);
                let _ = writeln!(src, "    _pad{}: vec2<f32>,", slot);
            }
            InputKind::Scalar => {
                let _ = writeln!(src, "    {}: f32,", decl.name);
                for j in 0..3 {
                    let _ = writeln!(src, "    _pad{}_{}: f32,", slot, j);
                }
            }
        }
    }
    src.push_str("};\n\n");
    src.push_str("@group(0) @binding(0) var<uniform> params: PassParams;\n");

    for (i, name) in layout.surfaces.iter().enumerate() {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var {}: texture_2d<f32>;",
            i + 1,
            binding_name(name)
        );
    }
    let _ = writeln!(
        src,
        "@group(0) @binding({}) var output: texture_storage_2d<rgba32float, write>;\n",
        output_binding(layout)
    );

    for name in &layout.surfaces {
        let texture = binding_name(name);
        let _ = writeln!(
            src,
            "fn load_{name}(p: vec2<i32>) -> vec4<f32> {{\n    \
             let last = vec2<i32>(textureDimensions({texture})) - vec2<i32>(1);\n    \
             return textureLoad({texture}, clamp(p, vec2<i32>(0), last), 0);\n}}\n"
        );
        let _ = writeln!(
            src,
            "fn sample_{name}(uv: vec2<f32>) -> vec4<f32> {{\n    \
             return load_{name}(vec2<i32>(floor(uv * params.resolution)));\n}}\n"
        );
    }

    src.push_str(body);
    src.push('\n');

    let _ = write!(
        src,
        "\n@compute @workgroup_size({ws}, {ws})\n\
         fn main(@builtin(global_invocation_id) id: vec3<u32>) {{\n    \
         let dims = vec2<u32>(params.resolution);\n    \
         if (id.x >= dims.x || id.y >= dims.y) {{\n        return;\n    }}\n    \
         let cell = vec2<i32>(id.xy);\n    \
         textureStore(output, cell, {f}(cell));\n}}\n",
        ws = WORKGROUP_SIZE,
        f = CELL_FUNCTION
    );

    src
}

/// Parameter block contents matching [`assemble`]'s `PassParams`.
pub fn params_data(resolution: GridSize, uniforms: &[UniformValue]) -> Vec<f32> {
    let [w, h] = resolution.resolution();
    let mut data = Vec::with_capacity(4 * (uniforms.len() + 1));
    data.extend_from_slice(&[w, h, 0.0, 0.0]);
    for value in uniforms {
        data.extend_from_slice(&value.to_slot());
    }
    data
}

/// Workgroup counts covering a grid.
#[inline]
pub fn workgroups(size: GridSize) -> (u32, u32) {
    (
        size.width.div_ceil(WORKGROUP_SIZE),
        size.height.div_ceil(WORKGROUP_SIZE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UniformDecl;

    fn layout() -> PassLayout {
        PassLayout {
            resolution: GridSize::new(10, 4),
            surfaces: vec!["heightmap".into(), "velocity".into()],
            uniforms: vec![
                UniformDecl::scalar("viscosity", 0.5),
                UniformDecl::vec2("mouse", [0.0, 1.0]),
            ],
        }
    }

    #[test]
    fn test_detects_cell_function() {
        assert!(defines_cell_function(
            "fn compute_cell(cell: vec2<i32>) -> vec4<f32> { return vec4<f32>(0.0); }"
        ));
        assert!(defines_cell_function("fn  compute_cell (c: vec2<i32>)"));
        assert!(!defines_cell_function("fn compute_cells(c: vec2<i32>)"));
        assert!(!defines_cell_function("fn other() {} // compute_cell"));
        assert!(!defines_cell_function("myfn compute_cell(c: vec2<i32>)"));
    }

    #[test]
    fn test_bindings_follow_layout_order() {
        let src = assemble(&layout(), "fn compute_cell(c: vec2<i32>) -> vec4<f32> { return vec4<f32>(0.0); }");
        assert!(src.contains("@group(0) @binding(1) var in_heightmap: texture_2d<f32>;"));
        assert!(src.contains("@group(0) @binding(2) var in_velocity: texture_2d<f32>;"));
        assert!(src.contains("@group(0) @binding(3) var output: texture_storage_2d<rgba32float, write>;"));
        assert!(src.contains("fn load_velocity(p: vec2<i32>)"));
        assert!(src.contains("fn sample_heightmap(uv: vec2<f32>)"));
        assert!(src.contains("    viscosity: f32,\n"));
        assert!(src.contains("    mouse: vec2<f32>,\n"));
        assert!(src.contains("@compute @workgroup_size(8, 8)"));
        assert_eq!(output_binding(&layout()), 3);
    }

    #[test]
    fn test_helper_names_do_not_collide_with_inputs() {
        let layout = PassLayout {
            resolution: GridSize::new(4, 4),
            surfaces: vec!["a".into(), "load_a".into(), "textureLoad".into()],
            uniforms: vec![
                UniformDecl::scalar("x", 0.0),
                UniformDecl::vec2("x_0", [0.0; 2]),
            ],
        };
        let src = assemble(&layout, "fn compute_cell(c: vec2<i32>) -> vec4<f32> { return load_a(c); }");

        // Every module-scope identifier is declared exactly once.
        for decl in [
            "var in_a:",
            "var in_load_a:",
            "var in_textureLoad:",
            "fn load_a(",
            "fn load_load_a(",
            "fn sample_load_a(",
            "fn load_textureLoad(",
        ] {
            assert_eq!(src.matches(decl).count(), 1, "{}", decl);
        }
        assert!(!src.contains("var load_a:"));
        assert!(!src.contains("var textureLoad:"));
        assert!(src.contains("textureLoad(in_textureLoad,"));

        // Padding is named by slot, so similar uniform names never clash.
        assert_eq!(src.matches("_pad1_0: f32").count(), 1);
        assert_eq!(src.matches("_pad2: vec2<f32>").count(), 1);
    }

    #[test]
    fn test_params_data_slots() {
        let data = params_data(
            GridSize::new(10, 4),
            &[UniformValue::Scalar(0.5), UniformValue::Vec2([0.25, 1.0])],
        );
        assert_eq!(
            data,
            vec![10.0, 4.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.25, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_workgroups_cover_grid() {
        assert_eq!(workgroups(GridSize::new(8, 8)), (1, 1));
        assert_eq!(workgroups(GridSize::new(9, 1)), (2, 1));
    }
}
