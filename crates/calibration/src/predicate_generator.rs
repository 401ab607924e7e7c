use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ciq_common::{CiqError, Result};
use ciq_lqp::{
    DataType, EncodingType, Expression, LogicalOperator, LqpNode, NodeKind, PredicateCondition,
    ScanType, Value,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::{CalibrationColumnSpecification, CalibrationConfiguration};

/// Number of distinct values the synthetic calibration columns draw from.
///
/// Selectivities map onto ordinals of this fixed domain, keeping value
/// generation independent of the actual table contents.
const VALUE_DOMAIN_SIZE: u64 = 10_000;

/// One point of the calibration enumeration space: which table, type,
/// encodings, selectivity, and scan flavor a generated predicate covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateConfiguration {
    /// Scanned table.
    pub table_name: String,
    /// Data type of the probed column(s).
    pub data_type: DataType,
    /// Encoding of the probed column.
    pub first_encoding: EncodingType,
    /// Encoding of the second operand column, for column-vs-column shapes.
    pub second_encoding: Option<EncodingType>,
    /// Encoding of the third operand column, for BETWEEN column shapes.
    pub third_encoding: Option<EncodingType>,
    /// Target selectivity within `[0, 1]`.
    pub selectivity: f32,
    /// Whether the predicate scans reference columns.
    pub reference_column: bool,
    /// Row count of the scanned table.
    pub row_count: u64,
}

impl Eq for PredicateConfiguration {}

impl Ord for PredicateConfiguration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.table_name
            .cmp(&other.table_name)
            .then_with(|| self.data_type.cmp(&other.data_type))
            .then_with(|| self.first_encoding.cmp(&other.first_encoding))
            .then_with(|| self.second_encoding.cmp(&other.second_encoding))
            .then_with(|| self.third_encoding.cmp(&other.third_encoding))
            .then_with(|| self.selectivity.total_cmp(&other.selectivity))
            .then_with(|| self.reference_column.cmp(&other.reference_column))
            .then_with(|| self.row_count.cmp(&other.row_count))
    }
}

impl PartialOrd for PredicateConfiguration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PredicateConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let second = self
            .second_encoding
            .map(|e| e.to_string())
            .unwrap_or_else(|| "{}".to_string());
        let third = self
            .third_encoding
            .map(|e| e.to_string())
            .unwrap_or_else(|| "{}".to_string());
        write!(
            f,
            "PredicateConfiguration({} - {} - {} - {second} - {third} - {} - {} - {})",
            self.table_name,
            self.selectivity,
            self.first_encoding,
            self.data_type,
            self.reference_column,
            self.row_count
        )
    }
}

/// Everything a predicate generator functor needs: the scanned table's leaf
/// node, the column catalog, and the configuration point to realize.
pub struct PredicateGeneratorInput<'a> {
    /// The stored-table leaf the predicate will scan.
    pub table: &'a Arc<LqpNode>,
    /// Columns of that table as seen by the calibration catalog.
    pub column_definitions: &'a [CalibrationColumnSpecification],
    /// The configuration point to realize.
    pub configuration: &'a PredicateConfiguration,
}

/// A predicate generator functor. Returns `Ok(None)` to skip a configuration
/// for which no suitable column exists.
pub type PredicateGenerator = fn(&PredicateGeneratorInput<'_>) -> Result<Option<Arc<Expression>>>;

/// Enumerates the Cartesian product of valid predicate configurations over
/// `tables`, totally ordered by the lexicographic order of the configuration
/// fields.
///
/// Pure: identical inputs yield an identical ordered sequence on every call.
pub fn generate_predicate_permutations(
    tables: &[(String, u64)],
    configuration: &CalibrationConfiguration,
) -> Vec<PredicateConfiguration> {
    let mut permutations = Vec::new();
    let second_encodings: Vec<Option<EncodingType>> = std::iter::once(None)
        .chain(configuration.encodings.iter().copied().map(Some))
        .collect();

    for (table_name, row_count) in tables {
        for &data_type in &configuration.data_types {
            for &first_encoding in &configuration.encodings {
                for &second_encoding in &second_encodings {
                    for &third_encoding in &second_encodings {
                        // A third operand column requires a second one.
                        if second_encoding.is_none() && third_encoding.is_some() {
                            continue;
                        }
                        for &selectivity in &configuration.selectivities {
                            for &reference_column in &configuration.reference_columns {
                                permutations.push(PredicateConfiguration {
                                    table_name: table_name.clone(),
                                    data_type,
                                    first_encoding,
                                    second_encoding,
                                    third_encoding,
                                    selectivity,
                                    reference_column,
                                    row_count: *row_count,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    permutations.sort();
    permutations.dedup();
    debug!(total = permutations.len(), "generated predicate permutations");
    permutations
}

/// Builds the predicate plan fragments for one configuration point.
///
/// Returns an empty vector when the functor skips the configuration. With
/// `generate_index_scan`, a side-by-side index-scan alternative of the same
/// predicate is emitted after the table-scan variant.
pub fn generate_predicates(
    generator: PredicateGenerator,
    column_definitions: &[CalibrationColumnSpecification],
    table: &Arc<LqpNode>,
    configuration: &PredicateConfiguration,
    generate_index_scan: bool,
) -> Result<Vec<Arc<LqpNode>>> {
    let input = PredicateGeneratorInput {
        table,
        column_definitions,
        configuration,
    };
    let Some(predicate) = generator(&input)? else {
        debug!(%configuration, "no suitable column; skipping configuration");
        return Ok(Vec::new());
    };

    let scan_input = if configuration.reference_column {
        reference_column_scan(table, column_definitions, configuration)?
    } else {
        table.clone()
    };

    let mut nodes = vec![LqpNode::predicate(predicate.clone(), &scan_input)];
    if generate_index_scan {
        nodes.push(LqpNode::predicate_with_scan_type(
            predicate,
            ScanType::IndexScan,
            &scan_input,
        ));
    }
    Ok(nodes)
}

/// An upstream scan retaining every row, so the measured predicate reads
/// reference columns instead of base columns.
fn reference_column_scan(
    table: &Arc<LqpNode>,
    column_definitions: &[CalibrationColumnSpecification],
    configuration: &PredicateConfiguration,
) -> Result<Arc<LqpNode>> {
    let column = find_column_for_configuration(
        column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    )
    .ok_or_else(|| {
        CiqError::UnknownColumn(format!(
            "no {} column with {} encoding for the reference scan",
            configuration.data_type, configuration.first_encoding
        ))
    })?;
    let column_expression = generate_column_expression(table, column)?;
    let lower_bound = generate_value_expression(configuration.data_type, 0.0, false)?;
    let keep_all = Expression::binary_predicate(
        column_expression,
        PredicateCondition::GreaterThanEquals,
        lower_bound,
    )?;
    Ok(LqpNode::predicate(keep_all, table))
}

/// `column BETWEEN value AND value`.
pub fn generate_predicate_between_value_value(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    let Some(column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let column_expression = generate_column_expression(input.table, column)?;
    let lower = generate_value_expression(configuration.data_type, 0.0, false)?;
    let upper = generate_value_expression(configuration.data_type, configuration.selectivity, false)?;
    Ok(Some(Expression::between(
        PredicateCondition::BetweenInclusive,
        column_expression,
        lower,
        upper,
    )?))
}

/// `column BETWEEN column AND column` over three distinct columns.
pub fn generate_predicate_between_column_column(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    let (Some(second_encoding), Some(third_encoding)) =
        (configuration.second_encoding, configuration.third_encoding)
    else {
        return Ok(None);
    };
    let Some(value_column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let Some(lower_column) = find_distinct_column(
        input.column_definitions,
        configuration.data_type,
        second_encoding,
        &[value_column.column_name.as_str()],
    ) else {
        return Ok(None);
    };
    let Some(upper_column) = find_distinct_column(
        input.column_definitions,
        configuration.data_type,
        third_encoding,
        &[
            value_column.column_name.as_str(),
            lower_column.column_name.as_str(),
        ],
    ) else {
        return Ok(None);
    };
    Ok(Some(Expression::between(
        PredicateCondition::BetweenInclusive,
        generate_column_expression(input.table, value_column)?,
        generate_column_expression(input.table, lower_column)?,
        generate_column_expression(input.table, upper_column)?,
    )?))
}

/// `column <= value`, the value drawn at the configured selectivity.
pub fn generate_predicate_column_value(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    let Some(column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let column_expression = generate_column_expression(input.table, column)?;
    let value =
        generate_value_expression(configuration.data_type, configuration.selectivity, false)?;
    Ok(Some(Expression::binary_predicate(
        column_expression,
        PredicateCondition::LessThanEquals,
        value,
    )?))
}

/// `column <= column` over two distinct columns.
pub fn generate_predicate_column_column(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    let Some(second_encoding) = configuration.second_encoding else {
        return Ok(None);
    };
    let Some(first_column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let Some(second_column) = find_distinct_column(
        input.column_definitions,
        configuration.data_type,
        second_encoding,
        &[first_column.column_name.as_str()],
    ) else {
        return Ok(None);
    };
    Ok(Some(Expression::binary_predicate(
        generate_column_expression(input.table, first_column)?,
        PredicateCondition::LessThanEquals,
        generate_column_expression(input.table, second_column)?,
    )?))
}

/// `column LIKE 'prefix%'`; string columns only. The prefix is drawn at the
/// configured selectivity with a trailing wildcard.
pub fn generate_predicate_like(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    if configuration.data_type != DataType::String {
        return Ok(None);
    }
    let Some(column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let column_expression = generate_column_expression(input.table, column)?;
    let pattern =
        generate_value_expression(DataType::String, configuration.selectivity, true)?;
    Ok(Some(Expression::binary_predicate(
        column_expression,
        PredicateCondition::Like,
        pattern,
    )?))
}

/// `column = 'value'`; string columns only.
pub fn generate_predicate_equi_on_strings(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    if configuration.data_type != DataType::String {
        return Ok(None);
    }
    let Some(column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let column_expression = generate_column_expression(input.table, column)?;
    let value =
        generate_value_expression(DataType::String, configuration.selectivity, false)?;
    Ok(Some(Expression::binary_predicate(
        column_expression,
        PredicateCondition::Equals,
        value,
    )?))
}

/// Disjunction of two tail scans on the same column, each covering half the
/// configured selectivity.
pub fn generate_predicate_or(
    input: &PredicateGeneratorInput<'_>,
) -> Result<Option<Arc<Expression>>> {
    let configuration = input.configuration;
    let Some(column) = find_column_for_configuration(
        input.column_definitions,
        configuration.data_type,
        configuration.first_encoding,
    ) else {
        return Ok(None);
    };
    let column_expression = generate_column_expression(input.table, column)?;
    let half = configuration.selectivity / 2.0;
    let lower_tail = Expression::binary_predicate(
        column_expression.clone(),
        PredicateCondition::LessThanEquals,
        generate_value_expression(configuration.data_type, half, false)?,
    )?;
    let upper_tail = Expression::binary_predicate(
        column_expression,
        PredicateCondition::GreaterThanEquals,
        generate_value_expression(configuration.data_type, 1.0 - half, false)?,
    )?;
    Ok(Some(Expression::logical(
        lower_tail,
        LogicalOperator::Or,
        upper_tail,
    )?))
}

/// First catalog column with the requested type and encoding.
fn find_column_for_configuration(
    column_definitions: &[CalibrationColumnSpecification],
    data_type: DataType,
    encoding: EncodingType,
) -> Option<&CalibrationColumnSpecification> {
    column_definitions
        .iter()
        .find(|column| column.data_type == data_type && column.encoding == encoding)
}

/// Like [`find_column_for_configuration`], excluding already-used columns.
fn find_distinct_column<'a>(
    column_definitions: &'a [CalibrationColumnSpecification],
    data_type: DataType,
    encoding: EncodingType,
    excluded_names: &[&str],
) -> Option<&'a CalibrationColumnSpecification> {
    column_definitions.iter().find(|column| {
        column.data_type == data_type
            && column.encoding == encoding
            && !excluded_names.contains(&column.column_name.as_str())
    })
}

/// Column reference into the stored-table leaf for a calibration column.
fn generate_column_expression(
    table: &Arc<LqpNode>,
    column: &CalibrationColumnSpecification,
) -> Result<Arc<Expression>> {
    let NodeKind::StoredTable { table: definition } = table.kind() else {
        return Err(CiqError::InvariantViolation(
            "calibration predicates scan stored tables".to_string(),
        ));
    };
    let column_id = definition.column_id(&column.column_name).ok_or_else(|| {
        CiqError::UnknownColumn(format!(
            "calibration column '{}' is not part of table '{}'",
            column.column_name, definition.name
        ))
    })?;
    Expression::column(table, column_id)
}

/// Deterministically maps a selectivity onto a value of the column domain.
///
/// The domain is the first [`VALUE_DOMAIN_SIZE`] ordinals, rendered per type;
/// strings enumerate fixed-width lowercase words whose lexicographic order
/// matches the ordinal order. `trailing_like` appends a `%` wildcard for LIKE
/// prefix matches.
pub fn generate_value_expression(
    data_type: DataType,
    selectivity: f32,
    trailing_like: bool,
) -> Result<Arc<Expression>> {
    let ordinal = (selectivity * VALUE_DOMAIN_SIZE as f32) as i64;
    let value = match data_type {
        DataType::Int => Value::Int(ordinal as i32),
        DataType::Long => Value::Long(ordinal),
        DataType::Float => Value::Float(ordinal as f32),
        DataType::Double => Value::Double(ordinal as f64),
        DataType::String => {
            let mut word = string_for_ordinal(ordinal as u64);
            if trailing_like {
                word.push('%');
            }
            Value::String(word)
        }
        DataType::Null => {
            return Err(CiqError::InvalidConfig(
                "cannot generate values for the null type".to_string(),
            ))
        }
    };
    Ok(Expression::value(value))
}

/// Fixed-width base-26 rendering; lexicographic order equals ordinal order.
fn string_for_ordinal(mut ordinal: u64) -> String {
    let mut letters = [b'a'; 3];
    for slot in letters.iter_mut().rev() {
        *slot = b'a' + (ordinal % 26) as u8;
        ordinal /= 26;
    }
    letters.iter().map(|b| *b as char).collect()
}
