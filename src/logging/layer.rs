// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Architectural layers a log call can originate from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LayerError;

/// The architectural tier a log call originates from.
///
/// Drives per-layer performance thresholds and error-escalation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Api,
    Service,
    Core,
    Infrastructure,
}

impl Layer {
    /// All layers, outermost first.
    pub const ALL: [Layer; 4] = [Layer::Api, Layer::Service, Layer::Core, Layer::Infrastructure];

    /// Lowercase name used in operation keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Api => "api",
            Layer::Service => "service",
            Layer::Core => "core",
            Layer::Infrastructure => "infrastructure",
        }
    }

    /// Position in the direction failures propagate: infrastructure first, api last.
    pub fn cascade_rank(&self) -> u8 {
        match self {
            Layer::Infrastructure => 0,
            Layer::Core => 1,
            Layer::Service => 2,
            Layer::Api => 3,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(Layer::Api),
            "service" => Ok(Layer::Service),
            "core" => Ok(Layer::Core),
            "infrastructure" => Ok(Layer::Infrastructure),
            _ => Err(LayerError::InvalidLayer(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Layer {
    type Error = LayerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
