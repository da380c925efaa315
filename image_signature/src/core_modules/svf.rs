// THEORY:
// SVF is the flat text interchange form of a signature, one line per image:
//
//     label, N, 7, w0,x0,y0,L0,a0,b0,c0,e0, w1,x1,y1,...
//
// `N` is the centroid count and the literal `7` is the number of coordinates per
// centroid, excluding the weight, so each centroid contributes eight numbers.
// Fields inside a centroid are joined by `,`, centroids and the header by `, `.
// Numbers use Rust's shortest round-trip decimal form, so parsing a rendered
// line restores the exact same floats.
//
// The label is free text (usually a file name) and may itself contain commas;
// the parser finds the numeric tail by its length instead of splitting blindly.

use crate::core_modules::feature_point::{Centroid, DIMENSIONS, FeaturePoint, Signature};
use crate::error::SerializationError;

const FIELDS_PER_CENTROID: usize = DIMENSIONS + 1;

fn render_centroid(centroid: &Centroid) -> String {
    let point = &centroid.point;
    [
        centroid.weight,
        point.x,
        point.y,
        point.l,
        point.a,
        point.b,
        point.c,
        point.e,
    ]
    .iter()
    .map(|value| value.to_string())
    .collect::<Vec<_>>()
    .join(",")
}

/// Renders `signature` as one SVF line, centroids in their current order.
pub fn to_svf(signature: &Signature, label: &str) -> String {
    let mut fields = Vec::with_capacity(signature.len() + 3);
    fields.push(label.to_string());
    fields.push(signature.len().to_string());
    fields.push(DIMENSIONS.to_string());
    fields.extend(signature.iter().map(render_centroid));
    fields.join(", ")
}

fn parse_number(token: &str) -> Result<f64, SerializationError> {
    token
        .parse::<f64>()
        .map_err(|_| SerializationError::Malformed(format!("`{token}` is not a number")))
}

/// Parses one SVF line back into its label and signature.
///
/// The label is returned exactly as written, commas and inner spacing included.
pub fn from_svf(line: &str) -> Result<(String, Signature), SerializationError> {
    let raw: Vec<&str> = line.trim().split(',').collect();
    let tokens: Vec<&str> = raw.iter().map(|token| token.trim()).collect();

    // The label spans tokens[..split]; tokens[split] is N, tokens[split + 1] the dimension.
    let split = (1..tokens.len().saturating_sub(1))
        .find(|&split| {
            tokens[split].parse::<usize>().is_ok_and(|count| {
                count
                    .checked_mul(FIELDS_PER_CENTROID)
                    .and_then(|fields| fields.checked_add(split + 2))
                    == Some(tokens.len())
            })
        })
        .ok_or_else(|| {
            SerializationError::Malformed(format!(
                "no `label, N, 7` header matches the {} fields present",
                tokens.len()
            ))
        })?;

    let label = raw[..split].join(",").trim().to_string();
    let dimension = tokens[split + 1];
    if dimension.parse::<usize>().ok() != Some(DIMENSIONS) {
        return Err(SerializationError::Malformed(format!(
            "dimension field is `{dimension}`, expected {DIMENSIONS}"
        )));
    }

    let values = tokens[split + 2..]
        .iter()
        .map(|token| parse_number(token))
        .collect::<Result<Vec<_>, _>>()?;

    let centroids = values
        .chunks_exact(FIELDS_PER_CENTROID)
        .map(|fields| Centroid {
            weight: fields[0],
            point: FeaturePoint::new(
                fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7],
            ),
        })
        .collect();

    Ok((label, Signature::from_centroids(centroids)))
}
