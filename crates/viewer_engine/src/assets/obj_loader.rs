//! OBJ file loader for 3D models
//!
//! Reads positions, texture coordinates and faces; normals and material
//! statements are ignored. Corners sharing the same position and texture
//! coordinate collapse into a single vertex.

use crate::render::Vertex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Vertex color assigned to every loaded vertex
pub const DEFAULT_VERTEX_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

#[derive(Error, Debug)]
pub enum ObjError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Decoded mesh ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Unique vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

/// Dedup key: exact bit patterns of position and texture coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VertexKey {
    pos: [u32; 3],
    tex_coord: [u32; 2],
}

impl VertexKey {
    fn new(pos: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos: pos.map(canonical_bits),
            tex_coord: tex_coord.map(canonical_bits),
        }
    }
}

// -0.0 and 0.0 compare equal, so they must share a key
fn canonical_bits(value: f32) -> u32 {
    if value == 0.0 {
        0.0f32.to_bits()
    } else {
        value.to_bits()
    }
}

pub struct ObjLoader;

impl ObjLoader {
    /// Load an OBJ file from disk
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<MeshData, ObjError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mesh = Self::parse(BufReader::new(file))?;
        log::info!(
            "Loaded {:?}: {} vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Parse OBJ text held in memory
    pub fn parse_str(source: &str) -> Result<MeshData, ObjError> {
        Self::parse(source.as_bytes())
    }

    /// Parse OBJ data from any buffered reader
    pub fn parse<R: BufRead>(reader: R) -> Result<MeshData, ObjError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut mesh = MeshData::default();
        let mut unique: HashMap<VertexKey, u32> = HashMap::new();

        for (line_index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = line_index + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => {
                    let values = parse_floats::<3>(&args, line_number, "vertex position")?;
                    positions.push(values);
                }
                "vt" => {
                    let values = parse_floats::<2>(&args, line_number, "texture coordinate")?;
                    tex_coords.push(values);
                }
                "f" => {
                    if args.len() < 3 {
                        return Err(ObjError::ParseError {
                            line: line_number,
                            message: format!("face needs at least 3 corners, got {}", args.len()),
                        });
                    }

                    let mut corners = Vec::with_capacity(args.len());
                    for corner in &args {
                        let vertex = resolve_corner(corner, &positions, &tex_coords, line_number)?;
                        let key = VertexKey::new(vertex.pos, vertex.tex_coord);
                        let index = *unique.entry(key).or_insert_with(|| {
                            mesh.vertices.push(vertex);
                            (mesh.vertices.len() - 1) as u32
                        });
                        corners.push(index);
                    }

                    // Fan triangulation
                    for i in 1..corners.len() - 1 {
                        mesh.indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if mesh.vertices.is_empty() {
            return Err(ObjError::InvalidFormat("No faces found in OBJ data".to_string()));
        }

        Ok(mesh)
    }
}

fn parse_floats<const N: usize>(
    args: &[&str],
    line: usize,
    what: &str,
) -> Result<[f32; N], ObjError> {
    if args.len() < N {
        return Err(ObjError::ParseError {
            line,
            message: format!("{what} needs {N} components, got {}", args.len()),
        });
    }

    let mut values = [0.0f32; N];
    for (value, text) in values.iter_mut().zip(args) {
        *value = text.parse().map_err(|_| ObjError::ParseError {
            line,
            message: format!("invalid {what} component '{text}'"),
        })?;
    }
    Ok(values)
}

/// Resolve a 1-based or negative (relative) OBJ index against `len` elements
fn resolve_index(text: &str, len: usize, line: usize, what: &str) -> Result<usize, ObjError> {
    let raw: i64 = text.parse().map_err(|_| ObjError::ParseError {
        line,
        message: format!("invalid {what} index '{text}'"),
    })?;

    let resolved = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(r.unsigned_abs()).ok().and_then(|back| len.checked_sub(back)),
    };

    resolved.filter(|&i| i < len).ok_or_else(|| ObjError::ParseError {
        line,
        message: format!("{what} index {raw} out of range (have {len})"),
    })
}

fn resolve_corner(
    corner: &str,
    positions: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
    line: usize,
) -> Result<Vertex, ObjError> {
    let mut fields = corner.split('/');
    let position_field = fields.next().unwrap_or_default();
    let position = positions[resolve_index(position_field, positions.len(), line, "position")?];

    let tex_coord = match fields.next() {
        Some(field) if !field.is_empty() => {
            let [u, v] = tex_coords[resolve_index(field, tex_coords.len(), line, "texture coordinate")?];
            [u, 1.0 - v]
        }
        _ => [0.0, 0.0],
    };

    Ok(Vertex {
        pos: position,
        color: DEFAULT_VERTEX_COLOR,
        tex_coord,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD: &str = "\
# two triangles sharing an edge
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";

    #[test]
    fn test_quad_shares_vertices() {
        let mesh = ObjLoader::parse_str(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.indices.iter().all(|&i| i < 4));
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_dedup_never_grows_vertex_count() {
        let mesh = ObjLoader::parse_str(QUAD).unwrap();
        let naive_corner_count = 6;
        assert!(mesh.vertices.len() <= naive_corner_count);
        assert!(mesh.indices.len() >= mesh.vertices.len());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = ObjLoader::parse_str(QUAD).unwrap();
        let second = ObjLoader::parse_str(QUAD).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_texcoord_v_is_flipped_and_color_is_white() {
        let mesh = ObjLoader::parse_str(QUAD).unwrap();
        let top_right = mesh.vertices[2];
        assert_relative_eq!(top_right.tex_coord[0], 1.0);
        assert_relative_eq!(top_right.tex_coord[1], 0.0);
        assert_eq!(top_right.color, DEFAULT_VERTEX_COLOR);
    }

    #[test]
    fn test_same_position_different_uv_stays_distinct() {
        let source = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 0.5 0.5
f 1/1 2/1 3/1
f 1/2 2/1 3/1
";
        let mesh = ObjLoader::parse_str(source).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_polygon_fan_triangulation() {
        let source = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v -1 1 0
f 1 2 3 4 5
";
        let mesh = ObjLoader::parse_str(source).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn test_negative_indices_and_normals() {
        let source = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 1
vn 0 0 1
f -3/-1/1 -2/-1/1 -1//1
";
        let mesh = ObjLoader::parse_str(source).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_relative_eq!(mesh.vertices[0].tex_coord[1], 0.0);
        assert_eq!(mesh.vertices[2].tex_coord, [0.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_index_is_reported() {
        let source = "v 0 0 0\nf 1 2 3\n";
        let err = ObjLoader::parse_str(source).unwrap_err();
        assert!(matches!(err, ObjError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_bad_float_is_reported() {
        let err = ObjLoader::parse_str("v 0 zero 0\n").unwrap_err();
        assert!(matches!(err, ObjError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_empty_source_is_invalid() {
        let err = ObjLoader::parse_str("# nothing here\n").unwrap_err();
        assert!(matches!(err, ObjError::InvalidFormat(_)));
    }

    #[test]
    fn test_load_obj_from_file() {
        let path = std::env::temp_dir().join("viewer_engine_quad_test.obj");
        std::fs::write(&path, QUAD).unwrap();
        let mesh = ObjLoader::load_obj(&path).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        let _ = std::fs::remove_file(&path);
    }
}
