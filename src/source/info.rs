use serde::Serialize;

use super::{LazySource, PixelSize};
use crate::array::{axes_to_string, Axis, DataType};

/// Size of one axis, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisSummary {
    pub axis: Axis,
    pub name: &'static str,
    pub size: usize,
}

/// Summary of a source, as printed by `hyperstack info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub identifier: String,
    pub axis_order: String,
    pub shape: Vec<usize>,
    pub axes: Vec<AxisSummary>,
    pub data_type: DataType,
    pub channel_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_size_um: Option<PixelSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_increment_ms: Option<f64>,
    #[serde(skip)]
    details: String,
}

impl SourceInfo {
    pub fn from_source(source: &dyn LazySource) -> Self {
        let model = source.axes();
        let metadata = source.metadata();
        let native: Vec<Axis> = model.axes().collect();

        // Channel names are listed per channel when the source has a C axis
        let channel_names = match model.size(Axis::C) {
            Some(count) => (0..count).map(|i| metadata.channel_name(i)).collect(),
            None => metadata.channel_names.clone(),
        };

        Self {
            identifier: source.identifier().to_string(),
            axis_order: axes_to_string(&native),
            shape: model.shape(),
            axes: model
                .iter()
                .map(|(axis, info)| AxisSummary {
                    axis,
                    name: axis.name(),
                    size: info.size,
                })
                .collect(),
            data_type: source.data_type(),
            channel_names,
            pixel_size_um: metadata.pixel_size,
            time_increment_ms: metadata.time_increment_ms,
            details: model.describe(),
        }
    }

    /// Multi-line text rendering.
    pub fn to_text(&self) -> String {
        let mut lines = vec![
            format!("File: {}", self.identifier),
            format!("Axes: {} {:?}", self.axis_order, self.shape),
            format!("Data type: {}", self.data_type),
        ];
        if !self.channel_names.is_empty() {
            lines.push(format!("Channels: {}", self.channel_names.join(", ")));
        }
        if let Some(px) = self.pixel_size_um {
            let z = px.z.map(|z| format!(" x {} (z)", z)).unwrap_or_default();
            lines.push(format!("Pixel size: {} x {}{} µm", px.x, px.y, z));
        }
        if let Some(dt) = self.time_increment_ms {
            lines.push(format!("Time increment: {} ms", dt));
        }
        lines.push(String::new());
        lines.push(self.details.clone());
        lines.join("\n")
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
