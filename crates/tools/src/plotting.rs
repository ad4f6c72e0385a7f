//! Plot creation (`create_plot`).
//!
//! Renders tabular data extracted during a session as a Vega-Lite
//! specification written under the configured output directory. The
//! front-end serves the directory and renders the spec client-side.

use std::path::PathBuf;

use alzassist_config::PlottingConfig;
use alzassist_core::error::ToolError;
use alzassist_core::schema::{ParamSpec, ParamType, ToolSpec};
use alzassist_core::tool::{Tool, ToolOutput, ToolRole};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

pub const TOOL_NAME: &str = "create_plot";

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotType {
    Bar,
    Scatter,
    Line,
    Box,
    Heatmap,
}

impl PlotType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bar" => Some(Self::Bar),
            "scatter" => Some(Self::Scatter),
            "line" => Some(Self::Line),
            "box" => Some(Self::Box),
            "heatmap" => Some(Self::Heatmap),
            _ => None,
        }
    }

    fn mark(&self) -> Value {
        match self {
            Self::Bar => json!("bar"),
            Self::Scatter => json!({"type": "point", "filled": true, "opacity": 0.7}),
            Self::Line => json!({"type": "line", "point": true}),
            Self::Box => json!("boxplot"),
            Self::Heatmap => json!("rect"),
        }
    }
}

/// Validated plot request.
#[derive(Debug)]
pub struct PlotRequest<'a> {
    pub plot_type: PlotType,
    pub data: &'a [Value],
    pub title: &'a str,
    pub x: Option<&'a str>,
    pub y: Option<&'a str>,
    pub x_label: Option<&'a str>,
    pub y_label: Option<&'a str>,
    pub hue: Option<&'a str>,
    pub size: Option<&'a str>,
}

impl<'a> PlotRequest<'a> {
    pub fn from_arguments(arguments: &'a Map<String, Value>) -> Result<Self, ToolError> {
        let text = |name: &str| arguments.get(name).and_then(Value::as_str);
        let invalid = |msg: String| ToolError::InvalidArguments(msg);

        let plot_type = text("plot_type")
            .and_then(PlotType::parse)
            .ok_or_else(|| invalid("plot_type must be one of bar, scatter, line, box, heatmap".into()))?;
        let data = arguments
            .get("data")
            .and_then(Value::as_array)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| invalid("data must be a non-empty array of objects".into()))?;
        let title = text("title")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| invalid("title is required".into()))?;

        let request = Self {
            plot_type,
            data,
            title,
            x: text("x"),
            y: text("y"),
            x_label: text("x_label"),
            y_label: text("y_label"),
            hue: text("hue"),
            size: text("size"),
        };

        if plot_type != PlotType::Heatmap && (request.x.is_none() || request.y.is_none()) {
            return Err(invalid(format!(
                "x and y parameters are required for {} plots",
                text("plot_type").unwrap_or_default()
            )));
        }
        if request.size.is_some() && plot_type != PlotType::Scatter {
            return Err(invalid("size is only supported for scatter plots".into()));
        }

        let referenced = [request.x, request.y, request.hue, request.size];
        for column in referenced.into_iter().flatten() {
            let missing = data
                .iter()
                .any(|row| row.as_object().is_none_or(|obj| !obj.contains_key(column)));
            if missing {
                return Err(invalid(format!("column '{column}' is missing from the data rows")));
            }
        }

        Ok(request)
    }

    fn is_numeric(&self, column: &str) -> bool {
        self.data
            .iter()
            .all(|row| row.get(column).is_some_and(Value::is_number))
    }

    fn field(&self, column: &str, title: Option<&str>) -> Value {
        let kind = if self.is_numeric(column) {
            "quantitative"
        } else {
            "nominal"
        };
        json!({ "field": column, "type": kind, "title": title.unwrap_or(column) })
    }

    /// Build the Vega-Lite specification.
    pub fn to_vega_lite(&self) -> Value {
        if self.plot_type == PlotType::Heatmap {
            return self.heatmap();
        }

        // Both present: checked in `from_arguments`.
        let x = self.x.unwrap_or_default();
        let y = self.y.unwrap_or_default();

        let mut x_enc = self.field(x, self.x_label);
        if matches!(self.plot_type, PlotType::Bar | PlotType::Box) {
            x_enc["type"] = json!("nominal");
            x_enc["axis"] = json!({ "labelAngle": -45 });
        }
        let mut encoding = json!({
            "x": x_enc,
            "y": self.field(y, self.y_label),
        });
        if let Some(hue) = self.hue {
            encoding["color"] = json!({ "field": hue, "type": "nominal" });
            if self.plot_type == PlotType::Bar {
                encoding["xOffset"] = json!({ "field": hue });
            }
        }
        if let Some(size) = self.size {
            encoding["size"] = json!({ "field": size, "type": "quantitative" });
        }

        json!({
            "$schema": VEGA_LITE_SCHEMA,
            "title": self.title,
            "width": 600,
            "height": 360,
            "data": { "values": self.data },
            "mark": self.plot_type.mark(),
            "encoding": encoding,
        })
    }

    /// Matrix rows become (row, column, value) cells with annotations.
    fn heatmap(&self) -> Value {
        let mut cells = Vec::new();
        for (i, row) in self.data.iter().enumerate() {
            let Some(obj) = row.as_object() else { continue };
            for (column, value) in obj {
                if value.is_number() {
                    cells.push(json!({ "row": i, "column": column, "value": value }));
                }
            }
        }

        json!({
            "$schema": VEGA_LITE_SCHEMA,
            "title": self.title,
            "width": 500,
            "height": 400,
            "data": { "values": cells },
            "encoding": {
                "x": { "field": "column", "type": "nominal", "title": null },
                "y": { "field": "row", "type": "ordinal", "title": null },
            },
            "layer": [
                {
                    "mark": self.plot_type.mark(),
                    "encoding": {
                        "color": {
                            "field": "value",
                            "type": "quantitative",
                            "scale": { "scheme": "redblue", "domainMid": 0, "reverse": true },
                        },
                    },
                },
                {
                    "mark": "text",
                    "encoding": {
                        "text": { "field": "value", "type": "quantitative", "format": ".2f" },
                    },
                },
            ],
        })
    }
}

pub struct PlottingTool {
    spec: ToolSpec,
    output_dir: PathBuf,
    url_prefix: String,
}

impl PlottingTool {
    pub fn new(config: &PlottingConfig) -> Self {
        let spec = ToolSpec::new(
            TOOL_NAME,
            "Create a data visualization. Supports bar charts, scatter plots, line plots, box \
             plots, and heatmaps. Use this to visualize data extracted from research papers.",
        )
        .param(
            ParamSpec::string("plot_type", "Type of plot to create")
                .required()
                .one_of(["bar", "scatter", "line", "box", "heatmap"]),
        )
        .param(
            ParamSpec::array(
                "data",
                ParamType::Object,
                "Array of row objects with keys matching x, y, and optional hue/size",
            )
            .required(),
        )
        .param(ParamSpec::string("title", "Plot title").required())
        .param(ParamSpec::string("x", "Column for the x-axis (all types except heatmap)"))
        .param(ParamSpec::string("y", "Column for the y-axis (all types except heatmap)"))
        .param(ParamSpec::string("x_label", "X-axis label (defaults to the x column)"))
        .param(ParamSpec::string("y_label", "Y-axis label (defaults to the y column)"))
        .param(ParamSpec::string("hue", "Column for color grouping (bar, scatter, line)"))
        .param(ParamSpec::string("size", "Column for point sizes (scatter only)"));

        Self {
            spec,
            output_dir: config.output_dir.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for PlottingTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        ToolRole::Plotting
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let request = PlotRequest::from_arguments(arguments)?;
        let spec = request.to_vega_lite();

        let plot_id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("plot_{}.vl.json", &plot_id[..8]);
        let plot_path = self.output_dir.join(&file_name);

        let body = serde_json::to_vec_pretty(&spec)
            .map_err(|e| ToolError::provider(TOOL_NAME, e.to_string()))?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ToolError::provider(TOOL_NAME, format!("cannot create plot dir: {e}")))?;
        tokio::fs::write(&plot_path, body)
            .await
            .map_err(|e| ToolError::provider(TOOL_NAME, format!("cannot write plot: {e}")))?;

        debug!(tool = TOOL_NAME, path = %plot_path.display(), "Plot written");

        Ok(ToolOutput::new(json!({
            "status": "success",
            "plot_path": plot_path.display().to_string(),
            "url": format!("{}/{}", self.url_prefix, file_name),
        })))
    }
}
