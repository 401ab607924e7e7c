use ciq_common::{CiqError, Result};
use ciq_lqp::{DataType, EncodingType};
use serde::{Deserialize, Serialize};

/// Catalog metadata of one column as seen by the calibration generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationColumnSpecification {
    /// Column name within its table.
    pub column_name: String,
    /// Scalar type of the column.
    pub data_type: DataType,
    /// Physical encoding of the column.
    pub encoding: EncodingType,
    /// Whether the column may hold NULLs.
    pub nullable: bool,
    /// Row count of the owning table.
    pub row_count: u64,
}

/// Enumeration space for calibration predicate generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfiguration {
    /// Data types to cover.
    pub data_types: Vec<DataType>,
    /// Encodings to cover.
    pub encodings: Vec<EncodingType>,
    /// Target selectivities, each within `[0, 1]`.
    pub selectivities: Vec<f32>,
    /// Whether to scan base columns, reference columns, or both.
    pub reference_columns: Vec<bool>,
}

impl Default for CalibrationConfiguration {
    fn default() -> Self {
        Self {
            data_types: vec![
                DataType::Int,
                DataType::Long,
                DataType::Float,
                DataType::Double,
                DataType::String,
            ],
            encodings: vec![EncodingType::Unencoded, EncodingType::Dictionary],
            selectivities: vec![0.01, 0.1, 0.5, 0.9],
            reference_columns: vec![false, true],
        }
    }
}

impl CalibrationConfiguration {
    /// Validates the enumeration space.
    pub fn validate(&self) -> Result<()> {
        if self.data_types.is_empty()
            || self.encodings.is_empty()
            || self.selectivities.is_empty()
            || self.reference_columns.is_empty()
        {
            return Err(CiqError::InvalidConfig(
                "calibration enumerations must not be empty".to_string(),
            ));
        }
        if self.data_types.contains(&DataType::Null) {
            return Err(CiqError::InvalidConfig(
                "cannot calibrate over the null type".to_string(),
            ));
        }
        for selectivity in &self.selectivities {
            if !selectivity.is_finite() || *selectivity < 0.0 || *selectivity > 1.0 {
                return Err(CiqError::InvalidConfig(format!(
                    "selectivity {selectivity} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
