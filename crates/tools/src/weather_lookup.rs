//! Weather lookup tool: deterministic offline conditions.
//!
//! Readings are derived from a hash of the location so runs are repeatable
//! without network access. The looked-up location is stored in the
//! `last_location` context variable for follow-up turns.

use async_trait::async_trait;
use agentrelay_core::error::ToolError;
use agentrelay_core::message::ContextVariables;
use agentrelay_core::tool::{Tool, ToolContext, ToolOutcome};
use serde::Serialize;

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up current weather for a location. Falls back to the last location asked about."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "default": "metric"
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        let location = arguments["location"]
            .as_str()
            .or_else(|| context.context_variables.get("last_location")?.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;

        let imperial = arguments["units"].as_str() == Some("imperial");
        let report = Reading::for_location(location, imperial);
        let output = serde_json::to_string(&report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;

        let mut updates = ContextVariables::new();
        updates.insert("last_location".into(), serde_json::json!(location));
        Ok(ToolOutcome::with_context(output, updates))
    }
}

#[derive(Debug, Serialize)]
struct Reading {
    location: String,
    temperature: f64,
    unit: &'static str,
    conditions: &'static str,
    humidity: u32,
}

const CONDITIONS: [&str; 6] = [
    "clear",
    "partly cloudy",
    "overcast",
    "light rain",
    "thunderstorms",
    "snow",
];

impl Reading {
    fn for_location(location: &str, imperial: bool) -> Self {
        let seed = location
            .to_lowercase()
            .bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));

        let celsius = f64::from(seed % 38) - 4.0;
        let (temperature, unit) = if imperial {
            (celsius * 9.0 / 5.0 + 32.0, "F")
        } else {
            (celsius, "C")
        };

        Self {
            location: location.to_string(),
            temperature: (temperature * 10.0).round() / 10.0,
            unit,
            conditions: CONDITIONS[(seed as usize / 7) % CONDITIONS.len()],
            humidity: 25 + seed % 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(outcome: ToolOutcome) -> (serde_json::Value, ContextVariables) {
        match outcome {
            ToolOutcome::Structured {
                value: Some(value),
                context_variables,
                agent: None,
            } => (serde_json::from_str(&value).unwrap(), context_variables),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn readings_are_deterministic() {
        let ctx = ToolContext::default();
        let a = WeatherLookupTool
            .execute(serde_json::json!({"location": "Oslo"}), &ctx)
            .await
            .unwrap();
        let b = WeatherLookupTool
            .execute(serde_json::json!({"location": "oslo"}), &ctx)
            .await
            .unwrap();
        let (a, updates) = parse(a);
        let (b, _) = parse(b);
        assert_eq!(a["temperature"], b["temperature"]);
        assert_eq!(a["unit"], "C");
        assert_eq!(updates["last_location"], "Oslo");
    }

    #[tokio::test]
    async fn imperial_units() {
        let (reading, _) = parse(
            WeatherLookupTool
                .execute(
                    serde_json::json!({"location": "Lima", "units": "imperial"}),
                    &ToolContext::default(),
                )
                .await
                .unwrap(),
        );
        assert_eq!(reading["unit"], "F");
    }

    #[tokio::test]
    async fn falls_back_to_last_location() {
        let mut ctx = ToolContext::default();
        ctx.context_variables
            .insert("last_location".into(), serde_json::json!("Nairobi"));
        let (reading, _) = parse(
            WeatherLookupTool
                .execute(serde_json::json!({}), &ctx)
                .await
                .unwrap(),
        );
        assert_eq!(reading["location"], "Nairobi");

        let err = WeatherLookupTool
            .execute(serde_json::json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
