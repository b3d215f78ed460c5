use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::iter::{Enumerate, Peekable};
use std::path::Path;

use anyhow::Context;
use fixedbitset::FixedBitSet;
use log::{debug, info, warn};
use thiserror::Error;

use crate::problem::cvrp::{create_instance_with, CVRPInstance, InstanceError, Node};
use crate::problem::travel_matrix::{FixSizedTravelMatrix, RoundingMode, TravelMatrix};
use crate::problem::Demand;

/**
CVRPLIB instances follow the TSPLIB95 layout (http://vrp.galgos.inf.puc-rio.br/index.php/en/),
restricted to what a euclidean CVRP needs:

NAME : E-n23-k3
COMMENT : (Christophides and Eilon, Min no of trucks: 3, Optimal value: 569)
TYPE : CVRP
DIMENSION : 23
EDGE_WEIGHT_TYPE : EUC_2D
CAPACITY : 4500
NODE_COORD_SECTION
1 266 235
...
DEMAND_SECTION
1 0
...
DEPOT_SECTION
1
-1
EOF

Node ids are 1-based and contiguous. The depot id is converted to a 0-based index.
 */
const NODE_COORD_SECTION: &str = "NODE_COORD_SECTION";
const DEMAND_SECTION: &str = "DEMAND_SECTION";
const DEPOT_SECTION: &str = "DEPOT_SECTION";
const DEPOT_SECTION_TERMINATOR: &str = "-1";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: {section} requires DIMENSION to be given first")]
    MissingDimension { line: usize, section: &'static str },
    #[error("line {line}: node id {id} outside of [1, {dimension}]")]
    IdOutOfRange {
        line: usize,
        id: i64,
        dimension: usize,
    },
    #[error("line {line}: cannot parse '{token}' as {expected}")]
    InvalidNumber {
        line: usize,
        token: String,
        expected: &'static str,
    },
    #[error("line {line}: expected {expected} values in {section}, got '{content}'")]
    MalformedLine {
        line: usize,
        section: &'static str,
        expected: usize,
        content: String,
    },
    #[error("line {line}: node id {id} given twice in {section}")]
    DuplicateId {
        line: usize,
        id: usize,
        section: &'static str,
    },
    #[error("input ended inside {section} after {read} of {expected} entries")]
    UnexpectedEndOfInput {
        section: &'static str,
        read: usize,
        expected: usize,
    },
    #[error("missing header field {0}")]
    MissingField(&'static str),
    #[error("missing section {0}")]
    MissingSection(&'static str),
    #[error("line {line}: unsupported {field} '{value}'")]
    Unsupported {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("line {line}: invalid {field}: {reason}")]
    InvalidValue {
        line: usize,
        field: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Invalid(#[from] InstanceError),
}

pub fn load_instance(path: impl AsRef<Path>, rounding: RoundingMode) -> anyhow::Result<CVRPInstance> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("cannot open instance {}", path.display()))?;
    let fallback_name = path
        .file_stem()
        .map(|it| it.to_string_lossy().to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let instance = CVRPLibReader::new(BufReader::new(f), rounding)
        .read(fallback_name)
        .with_context(|| format!("cannot parse instance {}", path.display()))?;
    info!(
        "loaded instance {} ({} customers, capacity {}, depot {}, longest arc {})",
        instance.name,
        instance.num_customers(),
        instance.capacity,
        instance.nodes[instance.depot].id,
        instance.travel_matrix().max_distance()
    );
    Ok(instance)
}

pub fn parse_instance(reader: impl BufRead, rounding: RoundingMode) -> Result<CVRPInstance, ParseError> {
    CVRPLibReader::new(reader, rounding).read("UNKNOWN")
}

struct CVRPLibReader<R: BufRead> {
    lines: Peekable<Enumerate<Lines<R>>>,
    rounding: RoundingMode,
    name: Option<String>,
    dimension: Option<usize>,
    capacity: Option<f64>,
    coords: Option<Vec<(f64, f64)>>,
    demands: Option<Vec<Demand>>,
    depot: Option<usize>,
    travel_matrix: Option<FixSizedTravelMatrix>,
}

impl<R: BufRead> CVRPLibReader<R> {
    fn new(reader: R, rounding: RoundingMode) -> Self {
        Self {
            lines: reader.lines().enumerate().peekable(),
            rounding,
            name: None,
            dimension: None,
            capacity: None,
            coords: None,
            demands: None,
            depot: None,
            travel_matrix: None,
        }
    }

    fn read(mut self, fallback_name: impl Into<String>) -> Result<CVRPInstance, ParseError> {
        while let Some((line_no, line)) = self.next_line()? {
            let keyword = line
                .split(|c: char| c == ':' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            match keyword {
                "NAME" => self.name = Some(header_value(&line).to_string()),
                "COMMENT" => debug!("comment: {}", header_value(&line)),
                "TYPE" => {
                    let value = header_value(&line);
                    if value != "CVRP" {
                        return Err(ParseError::Unsupported {
                            line: line_no,
                            field: "TYPE",
                            value: value.to_string(),
                        });
                    }
                }
                "EDGE_WEIGHT_TYPE" => {
                    let value = header_value(&line);
                    if value != "EUC_2D" {
                        return Err(ParseError::Unsupported {
                            line: line_no,
                            field: "EDGE_WEIGHT_TYPE",
                            value: value.to_string(),
                        });
                    }
                }
                "DIMENSION" => self.read_dimension(line_no, header_value(&line))?,
                "CAPACITY" => {
                    let capacity: f64 = parse_token(line_no, header_value(&line), "capacity")?;
                    if !(capacity > 0.0) {
                        return Err(ParseError::InvalidValue {
                            line: line_no,
                            field: "CAPACITY",
                            reason: format!("expected a positive number, got {}", capacity),
                        });
                    }
                    self.capacity = Some(capacity);
                }
                NODE_COORD_SECTION => self.read_coordinates(line_no)?,
                DEMAND_SECTION => self.read_demands(line_no)?,
                DEPOT_SECTION => self.read_depot(line_no)?,
                "EOF" => break,
                _ => debug!("ignoring line {}: '{}'", line_no, line),
            }
        }

        self.finish(fallback_name)
    }

    /// next non-empty, trimmed line together with its 1-based number
    fn next_line(&mut self) -> Result<Option<(usize, String)>, ParseError> {
        for (idx, line) in self.lines.by_ref() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some((idx + 1, trimmed.to_string())));
            }
        }
        Ok(None)
    }

    fn peek_is(&mut self, content: &str) -> bool {
        while let Some((_, Ok(line))) = self.lines.peek() {
            if line.trim().is_empty() {
                self.lines.next();
            } else {
                return line.trim() == content;
            }
        }
        false
    }

    fn read_dimension(&mut self, line_no: usize, value: &str) -> Result<(), ParseError> {
        let dimension: usize = parse_token(line_no, value, "dimension")?;
        if dimension == 0 {
            return Err(ParseError::InvalidValue {
                line: line_no,
                field: "DIMENSION",
                reason: "an instance needs at least the depot".to_string(),
            });
        }
        if let Some(previous) = self.dimension {
            if previous != dimension {
                return Err(ParseError::InvalidValue {
                    line: line_no,
                    field: "DIMENSION",
                    reason: format!("redefined from {} to {}", previous, dimension),
                });
            }
        }
        self.dimension = Some(dimension);
        Ok(())
    }

    fn required_dimension(&self, line_no: usize, section: &'static str) -> Result<usize, ParseError> {
        self.dimension.ok_or(ParseError::MissingDimension {
            line: line_no,
            section,
        })
    }

    /// Reads `dimension` entries of a section, each with `expected` tokens where the first one
    /// is the node id. Returns the 0-based index and the remaining tokens per line.
    fn read_section_entries(
        &mut self,
        section: &'static str,
        expected: usize,
        mut on_entry: impl FnMut(usize, usize, &[&str]) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        let dimension = self.dimension.unwrap_or_default();
        let mut seen = FixedBitSet::with_capacity(dimension);
        for read in 0..dimension {
            let (line_no, line) = self.next_line()?.ok_or(ParseError::UnexpectedEndOfInput {
                section,
                read,
                expected: dimension,
            })?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != expected {
                return Err(ParseError::MalformedLine {
                    line: line_no,
                    section,
                    expected,
                    content: line.clone(),
                });
            }
            let idx = parse_node_id(line_no, tokens[0], dimension)?;
            if seen.put(idx) {
                return Err(ParseError::DuplicateId {
                    line: line_no,
                    id: idx + 1,
                    section,
                });
            }
            on_entry(line_no, idx, &tokens[1..])?;
        }
        Ok(())
    }

    fn read_coordinates(&mut self, line_no: usize) -> Result<(), ParseError> {
        let dimension = self.required_dimension(line_no, NODE_COORD_SECTION)?;
        let mut coords = vec![(0.0, 0.0); dimension];
        self.read_section_entries(NODE_COORD_SECTION, 3, |line_no, idx, tokens| {
            let x: f64 = parse_token(line_no, tokens[0], "x coordinate")?;
            let y: f64 = parse_token(line_no, tokens[1], "y coordinate")?;
            coords[idx] = (x, y);
            Ok(())
        })?;
        self.travel_matrix = Some(FixSizedTravelMatrix::with_euclidean_distances(
            &coords,
            self.rounding,
        ));
        self.coords = Some(coords);
        Ok(())
    }

    fn read_demands(&mut self, line_no: usize) -> Result<(), ParseError> {
        let dimension = self.required_dimension(line_no, DEMAND_SECTION)?;
        let mut demands = vec![0; dimension];
        self.read_section_entries(DEMAND_SECTION, 2, |line_no, idx, tokens| {
            demands[idx] = parse_token(line_no, tokens[0], "non-negative integer demand")?;
            Ok(())
        })?;
        self.demands = Some(demands);
        Ok(())
    }

    fn read_depot(&mut self, line_no: usize) -> Result<(), ParseError> {
        let dimension = self.required_dimension(line_no, DEPOT_SECTION)?;
        let (line_no, line) = self.next_line()?.ok_or(ParseError::UnexpectedEndOfInput {
            section: DEPOT_SECTION,
            read: 0,
            expected: 1,
        })?;
        self.depot = Some(parse_node_id(line_no, &line, dimension)?);
        if self.peek_is(DEPOT_SECTION_TERMINATOR) {
            self.lines.next();
        }
        Ok(())
    }

    fn finish(self, fallback_name: impl Into<String>) -> Result<CVRPInstance, ParseError> {
        self.dimension.ok_or(ParseError::MissingField("DIMENSION"))?;
        let capacity = self.capacity.ok_or(ParseError::MissingField("CAPACITY"))?;
        let coords = self.coords.ok_or(ParseError::MissingSection(NODE_COORD_SECTION))?;
        let travel_matrix = self
            .travel_matrix
            .ok_or(ParseError::MissingSection(NODE_COORD_SECTION))?;
        let demands = self.demands.ok_or(ParseError::MissingSection(DEMAND_SECTION))?;
        let depot = self.depot.unwrap_or_else(|| {
            warn!("no {} given, using node 1 as depot", DEPOT_SECTION);
            0
        });

        let nodes = coords
            .into_iter()
            .zip(demands)
            .enumerate()
            .map(|(idx, ((x, y), demand))| Node {
                id: idx + 1,
                x,
                y,
                demand,
            })
            .collect();

        Ok(create_instance_with(
            self.name.unwrap_or_else(|| fallback_name.into()),
            capacity,
            nodes,
            depot,
            travel_matrix,
        )?)
    }
}

fn header_value(line: &str) -> &str {
    match line.split_once(':') {
        Some((_, value)) => value.trim(),
        None => line
            .split_once(char::is_whitespace)
            .map(|(_, value)| value.trim())
            .unwrap_or_default(),
    }
}

fn parse_token<T: std::str::FromStr>(
    line: usize,
    token: &str,
    expected: &'static str,
) -> Result<T, ParseError> {
    token.parse::<T>().map_err(|_| ParseError::InvalidNumber {
        line,
        token: token.to_string(),
        expected,
    })
}

fn parse_node_id(line: usize, token: &str, dimension: usize) -> Result<usize, ParseError> {
    let id: i64 = parse_token(line, token, "node id")?;
    if id < 1 || id as usize > dimension {
        return Err(ParseError::IdOutOfRange {
            line,
            id,
            dimension,
        });
    }
    Ok(id as usize - 1)
}
