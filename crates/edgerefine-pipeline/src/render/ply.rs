//! Minimal PLY reader for triangle meshes.
//!
//! Supports `ascii` and `binary_little_endian` bodies, arbitrary scalar types
//! for vertex coordinates, and face index lists. Faces with more than three
//! vertices are fan-triangulated. Elements other than `vertex` and `face` are
//! parsed and discarded.

use super::mesh::TriangleMesh;
use edgerefine_core::Pt3;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("failed to read PLY file")]
    Io(#[from] std::io::Error),
    #[error("invalid PLY header: {0}")]
    InvalidHeader(String),
    #[error("unsupported PLY format `{0}`")]
    UnsupportedFormat(String),
    #[error("unsupported PLY data type `{0}`")]
    UnsupportedType(String),
    #[error("vertex element lacks x/y/z properties")]
    MissingCoordinates,
    #[error("unexpected end of data in element `{0}`")]
    Truncated(String),
    #[error("invalid value `{0}` in PLY body")]
    InvalidValue(String),
    #[error("face references vertex {index} but only {vertex_count} vertices exist")]
    IndexOutOfRange { index: usize, vertex_count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyDataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl PlyDataType {
    fn parse(s: &str) -> Result<Self, PlyError> {
        Ok(match s {
            "char" | "int8" => Self::Int8,
            "uchar" | "uint8" => Self::UInt8,
            "short" | "int16" => Self::Int16,
            "ushort" | "uint16" => Self::UInt16,
            "int" | "int32" => Self::Int32,
            "uint" | "uint32" => Self::UInt32,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            other => return Err(PlyError::UnsupportedType(other.to_string())),
        })
    }

    fn size_of(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PlyProperty {
    Scalar {
        name: String,
        ty: PlyDataType,
    },
    List {
        name: String,
        count_ty: PlyDataType,
        item_ty: PlyDataType,
    },
}

impl PlyProperty {
    fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::List { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlyElement {
    name: String,
    count: usize,
    properties: Vec<PlyProperty>,
}

#[derive(Debug)]
struct PlyHeader {
    format: PlyFormat,
    elements: Vec<PlyElement>,
}

/// Split the file into its parsed header and the body bytes.
fn parse_header(bytes: &[u8]) -> Result<(PlyHeader, &[u8]), PlyError> {
    let mut format = None;
    let mut elements: Vec<PlyElement> = Vec::new();
    let mut offset = 0;
    let mut first = true;

    loop {
        let rest = &bytes[offset..];
        let Some(eol) = rest.iter().position(|&b| b == b'\n') else {
            return Err(PlyError::InvalidHeader("missing end_header".into()));
        };
        let line = std::str::from_utf8(&rest[..eol])
            .map_err(|_| PlyError::InvalidHeader("non-UTF-8 header line".into()))?
            .trim();
        offset += eol + 1;

        if first {
            if line != "ply" {
                return Err(PlyError::InvalidHeader("missing `ply` magic".into()));
            }
            first = false;
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["end_header"] => break,
            ["format", "ascii", _] => format = Some(PlyFormat::Ascii),
            ["format", "binary_little_endian", _] => format = Some(PlyFormat::BinaryLittleEndian),
            ["format", other, ..] => return Err(PlyError::UnsupportedFormat(other.to_string())),
            ["comment", ..] | ["obj_info", ..] | [] => {}
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| PlyError::InvalidHeader(format!("bad element count `{count}`")))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_ty, item_ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| PlyError::InvalidHeader("property before element".into()))?;
                element.properties.push(PlyProperty::List {
                    name: name.to_string(),
                    count_ty: PlyDataType::parse(count_ty)?,
                    item_ty: PlyDataType::parse(item_ty)?,
                });
            }
            ["property", ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| PlyError::InvalidHeader("property before element".into()))?;
                element.properties.push(PlyProperty::Scalar {
                    name: name.to_string(),
                    ty: PlyDataType::parse(ty)?,
                });
            }
            _ => return Err(PlyError::InvalidHeader(format!("unexpected line `{line}`"))),
        }
    }

    let format = format.ok_or_else(|| PlyError::InvalidHeader("missing format".into()))?;
    Ok((PlyHeader { format, elements }, &bytes[offset..]))
}

/// Sequential value reader over the PLY body.
enum BodyReader<'a> {
    Ascii(std::str::SplitAsciiWhitespace<'a>),
    Binary { data: &'a [u8], pos: usize },
}

impl<'a> BodyReader<'a> {
    fn new(format: PlyFormat, body: &'a [u8]) -> Result<Self, PlyError> {
        Ok(match format {
            PlyFormat::Ascii => {
                let text = std::str::from_utf8(body)
                    .map_err(|_| PlyError::InvalidValue("non-UTF-8 ascii body".into()))?;
                Self::Ascii(text.split_ascii_whitespace())
            }
            PlyFormat::BinaryLittleEndian => Self::Binary { data: body, pos: 0 },
        })
    }

    fn read(&mut self, ty: PlyDataType, element: &str) -> Result<f64, PlyError> {
        match self {
            Self::Ascii(tokens) => {
                let token = tokens
                    .next()
                    .ok_or_else(|| PlyError::Truncated(element.to_string()))?;
                token
                    .parse::<f64>()
                    .map_err(|_| PlyError::InvalidValue(token.to_string()))
            }
            Self::Binary { data, pos } => {
                let n = ty.size_of();
                let bytes = data
                    .get(*pos..*pos + n)
                    .ok_or_else(|| PlyError::Truncated(element.to_string()))?;
                *pos += n;
                let mut buf = [0u8; 8];
                buf[..n].copy_from_slice(bytes);
                Ok(match ty {
                    PlyDataType::Int8 => buf[0] as i8 as f64,
                    PlyDataType::UInt8 => buf[0] as f64,
                    PlyDataType::Int16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
                    PlyDataType::UInt16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
                    PlyDataType::Int32 => {
                        i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64
                    }
                    PlyDataType::UInt32 => {
                        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64
                    }
                    PlyDataType::Float32 => {
                        f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64
                    }
                    PlyDataType::Float64 => f64::from_le_bytes(buf),
                })
            }
        }
    }
}

fn as_index(v: f64) -> Result<usize, PlyError> {
    if v >= 0.0 && v.fract() == 0.0 {
        Ok(v as usize)
    } else {
        Err(PlyError::InvalidValue(v.to_string()))
    }
}

/// Parse a PLY mesh from memory.
pub fn parse_ply_mesh(bytes: &[u8]) -> Result<TriangleMesh, PlyError> {
    let (header, body) = parse_header(bytes)?;
    let mut reader = BodyReader::new(header.format, body)?;
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();

    for element in &header.elements {
        let coord_idx = if element.name == "vertex" {
            let find = |axis: &str| {
                element
                    .properties
                    .iter()
                    .position(|p| matches!(p, PlyProperty::Scalar { .. }) && p.name() == axis)
            };
            match (find("x"), find("y"), find("z")) {
                (Some(x), Some(y), Some(z)) => Some([x, y, z]),
                _ => return Err(PlyError::MissingCoordinates),
            }
        } else {
            None
        };

        let mut scalars = vec![0.0; element.properties.len()];
        let mut list = Vec::new();
        for _ in 0..element.count {
            for (pi, prop) in element.properties.iter().enumerate() {
                match prop {
                    PlyProperty::Scalar { ty, .. } => {
                        scalars[pi] = reader.read(*ty, &element.name)?;
                    }
                    PlyProperty::List {
                        name,
                        count_ty,
                        item_ty,
                    } => {
                        let n = as_index(reader.read(*count_ty, &element.name)?)?;
                        list.clear();
                        for _ in 0..n {
                            list.push(reader.read(*item_ty, &element.name)?);
                        }
                        let is_face_indices = element.name == "face"
                            && (name == "vertex_indices" || name == "vertex_index");
                        if is_face_indices && n >= 3 {
                            let idx = list
                                .iter()
                                .map(|&v| as_index(v))
                                .collect::<Result<Vec<_>, _>>()?;
                            for k in 1..n - 1 {
                                triangles.push([idx[0], idx[k], idx[k + 1]]);
                            }
                        }
                    }
                }
            }
            if let Some([x, y, z]) = coord_idx {
                vertices.push(Pt3::new(scalars[x], scalars[y], scalars[z]));
            }
        }
    }

    let vertex_count = vertices.len();
    if let Some(&index) = triangles.iter().flatten().find(|&&i| i >= vertex_count) {
        return Err(PlyError::IndexOutOfRange {
            index,
            vertex_count,
        });
    }
    Ok(TriangleMesh {
        vertices,
        triangles,
    })
}

/// Read a PLY mesh file.
pub fn read_ply_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, PlyError> {
    let bytes = std::fs::read(path)?;
    parse_ply_mesh(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ASCII_QUAD: &str = "ply\nformat ascii 1.0\ncomment quad\nelement vertex 4\n\
property float x\nproperty float y\nproperty float z\nproperty uchar red\n\
element face 1\nproperty list uchar int vertex_indices\nend_header\n\
0 0 0 255\n1 0 0 255\n1 1 0 255\n0 1 0 255\n4 0 1 2 3\n";

    #[test]
    fn parses_ascii_quad_with_fan_triangulation() {
        let mesh = parse_ply_mesh(ASCII_QUAD.as_bytes()).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(mesh.vertices[2], Pt3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn parses_binary_little_endian() {
        let header = "ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
property double x\nproperty double y\nproperty double z\nproperty float nx\n\
element face 1\nproperty list uchar uint vertex_indices\nend_header\n";
        let mut bytes = header.as_bytes().to_vec();
        for v in [[0.0f64, 0.0, 1.0], [0.5, 0.0, 1.0], [0.0, 0.5, 1.0]] {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&0.0f32.to_le_bytes());
        }
        bytes.push(3);
        for i in [0u32, 1, 2] {
            bytes.extend_from_slice(&i.to_le_bytes());
        }

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let mesh = read_ply_mesh(file.path()).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[1], Pt3::new(0.5, 0.0, 1.0));
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn truncated_body_is_reported() {
        let text = ASCII_QUAD.trim_end_matches("4 0 1 2 3\n");
        assert!(matches!(
            parse_ply_mesh(text.as_bytes()),
            Err(PlyError::Truncated(_))
        ));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let text = ASCII_QUAD.replace("4 0 1 2 3", "3 0 1 7");
        assert!(matches!(
            parse_ply_mesh(text.as_bytes()),
            Err(PlyError::IndexOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn rejects_big_endian() {
        let text = "ply\nformat binary_big_endian 1.0\nend_header\n";
        assert!(matches!(
            parse_ply_mesh(text.as_bytes()),
            Err(PlyError::UnsupportedFormat(_))
        ));
    }
}
