//! Text world datafile parser
//!
//! Datafile is a whitespace-separated token stream: triangle count N
//! followed by N triangles, each one as three `x y z u v` vertices.

use crate::math::Vec3f;

use super::Triangle;

/// Count of numbers per triangle
const TRIANGLE_NUMBER_COUNT: usize = 15;

/// Datafile contents error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatafileError {
    /// Datafile is empty
    #[error("triangle count is missing")]
    MissingTriangleCount,

    /// First token is not a positive integer
    #[error("invalid triangle count \"{0}\"")]
    InvalidTriangleCount(String),

    /// Vertex component can't be parsed
    #[error("invalid number \"{token}\"")]
    InvalidNumber {
        /// Token contents
        token: String,
    },

    /// Datafile contains less triangles than declared
    #[error("datafile truncated: {expected} triangles declared, {found} found")]
    Truncated {
        /// Declared triangle count
        expected: usize,

        /// Complete triangles read
        found: usize,
    },
}

/// Parse datafile contents. Vertex positions are multiplied by `scale`.
pub fn parse(text: &str, scale: f32) -> Result<Vec<Triangle>, DatafileError> {
    let mut tokens = text.split_whitespace();

    let count_token = tokens.next().ok_or(DatafileError::MissingTriangleCount)?;
    let count = count_token
        .parse::<usize>()
        .ok()
        .filter(|count| *count > 0)
        .ok_or_else(|| DatafileError::InvalidTriangleCount(count_token.to_string()))?;

    // every number takes at least two bytes (digit and separator), so count can't exceed this
    let max_count = text.len() / (TRIANGLE_NUMBER_COUNT * 2);
    let mut triangles = Vec::with_capacity(count.min(max_count));
    let mut numbers = [0.0f32; TRIANGLE_NUMBER_COUNT];

    for _ in 0..count {
        for number in &mut numbers {
            let token = tokens.next().ok_or(DatafileError::Truncated {
                expected: count,
                found: triangles.len(),
            })?;

            *number = token.parse::<f32>().map_err(|_| DatafileError::InvalidNumber {
                token: token.to_string(),
            })?;
        }

        let mut triangle = Triangle::from_xyzuv([
            [numbers[0], numbers[1], numbers[2], numbers[3], numbers[4]],
            [numbers[5], numbers[6], numbers[7], numbers[8], numbers[9]],
            [numbers[10], numbers[11], numbers[12], numbers[13], numbers[14]],
        ]);

        for vertex in &mut triangle.vertices {
            vertex.position *= scale;
        }

        triangles.push(triangle);
    }

    if tokens.next().is_some() {
        log::debug!("datafile has data after {} triangles, ignored", count);
    }

    Ok(triangles)
}

/// Write triangles in datafile format
pub fn write(triangles: &[Triangle]) -> String {
    let mut text = format!("{}\n", triangles.len());

    for triangle in triangles {
        for vertex in &triangle.vertices {
            let Vec3f { x, y, z } = vertex.position;
            text.push_str(&format!("{} {} {} {} {}\n", x, y, z, vertex.uv.x, vertex.uv.y));
        }
    }

    text
}
