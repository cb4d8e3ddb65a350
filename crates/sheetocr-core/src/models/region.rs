//! Region instructions: `page,destination,x1,y1,x2,y2`.
//!
//! Rectangles are in the pixel space of a page rasterized at the configured
//! DPI (see [`RasterConfig`](crate::models::config::RasterConfig)). `x2` and
//! `y2` are exclusive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RegionParseError;

const FIELD_NAMES: [&str; 6] = ["page", "destination", "x1", "y1", "x2", "y2"];

/// Sheet column holding the entity id. Job cells start right after it.
pub const ENTITY_COLUMN: usize = 1;

/// Axis-aligned rectangle in raster pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    /// Create a rectangle, rejecting inverted or empty ones.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self, RegionParseError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(RegionParseError::InvertedRect { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Intersect with a `width` x `height` page anchored at the origin.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        if self.x1 >= x2 || self.y1 >= y2 {
            return None;
        }
        Some(Rect {
            x1: self.x1,
            y1: self.y1,
            x2,
            y2,
        })
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// One extraction instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionJob {
    /// 1-based page index.
    pub page: u32,
    /// Sink location, passed through untouched.
    pub destination: String,
    pub rect: Rect,
}

impl RegionJob {
    /// Parse a serialized instruction.
    pub fn parse(raw: &str) -> Result<Self, RegionParseError> {
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        if fields.len() != FIELD_NAMES.len() {
            return Err(RegionParseError::Arity(fields.len()));
        }

        let page = parse_number(&fields, 0)?;
        if page == 0 {
            return Err(RegionParseError::PageZero);
        }

        let destination = fields[1];
        if destination.is_empty() {
            return Err(RegionParseError::EmptyDestination);
        }

        let rect = Rect::new(
            parse_number(&fields, 2)?,
            parse_number(&fields, 3)?,
            parse_number(&fields, 4)?,
            parse_number(&fields, 5)?,
        )?;

        Ok(Self {
            page,
            destination: destination.to_string(),
            rect,
        })
    }
}

fn parse_number(fields: &[&str], index: usize) -> Result<u32, RegionParseError> {
    fields[index]
        .parse::<u32>()
        .map_err(|_| RegionParseError::NotANumber {
            field: FIELD_NAMES[index],
            position: index + 1,
            value: fields[index].to_string(),
        })
}

impl FromStr for RegionJob {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical serialized form.
impl fmt::Display for RegionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.page, self.destination, self.rect.x1, self.rect.y1, self.rect.x2, self.rect.y2
        )
    }
}

/// One row of the configuration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub entity_id: String,
    /// Job cells, starting at the column after the entity id.
    pub cells: Vec<String>,
}

/// A configured job cell and its parse outcome.
#[derive(Debug, Clone)]
pub struct JobSlot {
    /// 1-based sheet column the cell came from.
    pub column: usize,
    pub raw: String,
    pub parsed: Result<RegionJob, RegionParseError>,
}

/// All region jobs for one entity.
#[derive(Debug, Clone)]
pub struct EntityJobSet {
    pub entity_id: String,
    /// Non-empty cells in column order, malformed ones included.
    pub slots: Vec<JobSlot>,
}

impl EntityJobSet {
    /// Build the job set for a configuration row.
    ///
    /// Malformed cells are recorded in place and never stop the row.
    pub fn from_row(row: &ConfigRow) -> Self {
        let slots = row
            .cells
            .iter()
            .enumerate()
            .filter(|(_, raw)| !raw.trim().is_empty())
            .map(|(index, raw)| {
                let column = ENTITY_COLUMN + 1 + index;
                let parsed = RegionJob::parse(raw);
                if let Err(ref e) = parsed {
                    warn!(entity = %row.entity_id, column, raw = %raw, "Malformed region config: {}", e);
                }
                JobSlot {
                    column,
                    raw: raw.clone(),
                    parsed,
                }
            })
            .collect();

        Self {
            entity_id: row.entity_id.clone(),
            slots,
        }
    }

    /// Successfully parsed jobs with their column.
    pub fn jobs(&self) -> impl Iterator<Item = (usize, &RegionJob)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.parsed.as_ref().ok().map(|job| (slot.column, job)))
    }

    /// Number of cells that failed to parse.
    pub fn malformed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.parsed.is_err()).count()
    }

    /// Distinct pages in order of first reference.
    pub fn distinct_pages(&self) -> Vec<u32> {
        let mut pages = Vec::new();
        for (_, job) in self.jobs() {
            if !pages.contains(&job.page) {
                pages.push(job.page);
            }
        }
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid() {
        let job = RegionJob::parse("1,A1,0,0,100,50").unwrap();
        assert_eq!(job.page, 1);
        assert_eq!(job.destination, "A1");
        assert_eq!(job.rect, Rect { x1: 0, y1: 0, x2: 100, y2: 50 });
    }

    #[test]
    fn test_round_trip_canonical() {
        let cases = [
            ("1,A1,0,0,100,50", "1,A1,0,0,100,50"),
            (" 2 , B2 , 010, 5,300 ,  60 ", "2,B2,10,5,300,60"),
            ("12,Sheet!C3,1,2,3,4", "12,Sheet!C3,1,2,3,4"),
        ];
        for (input, canonical) in cases {
            let job = RegionJob::parse(input).unwrap();
            assert_eq!(job.to_string(), canonical);
            assert_eq!(RegionJob::parse(&job.to_string()).unwrap(), job);
        }
    }

    #[test]
    fn test_parse_wrong_arity() {
        assert_eq!(
            RegionJob::parse("x,A1,0,0,100"),
            Err(RegionParseError::Arity(5))
        );
        assert_eq!(
            RegionJob::parse("1,A1,0,0,100,50,7"),
            Err(RegionParseError::Arity(7))
        );
    }

    #[test]
    fn test_parse_non_numeric_names_field() {
        let err = RegionJob::parse("1,A1,0,zero,100,50").unwrap_err();
        assert_eq!(
            err,
            RegionParseError::NotANumber {
                field: "y1",
                position: 4,
                value: "zero".to_string(),
            }
        );

        // Negative coordinates are not accepted.
        assert!(matches!(
            RegionJob::parse("1,A1,-5,0,100,50"),
            Err(RegionParseError::NotANumber { field: "x1", .. })
        ));
    }

    #[test]
    fn test_parse_inverted_rect() {
        assert_eq!(
            RegionJob::parse("1,A1,100,0,10,50"),
            Err(RegionParseError::InvertedRect { x1: 100, y1: 0, x2: 10, y2: 50 })
        );
        assert!(RegionJob::parse("1,A1,0,50,100,50").is_err());
    }

    #[test]
    fn test_parse_page_and_destination() {
        assert_eq!(RegionJob::parse("0,A1,0,0,1,1"), Err(RegionParseError::PageZero));
        assert_eq!(
            RegionJob::parse("1, ,0,0,1,1"),
            Err(RegionParseError::EmptyDestination)
        );
        // Destination is opaque.
        assert!(RegionJob::parse("1,not a cell!,0,0,1,1").is_ok());
    }

    #[test]
    fn test_clip() {
        let rect = Rect::new(50, 50, 150, 150).unwrap();
        assert_eq!(rect.clip_to(100, 120), Some(Rect { x1: 50, y1: 50, x2: 100, y2: 120 }));
        assert_eq!(rect.clip_to(50, 200), None);
        assert_eq!(rect.clip_to(200, 200), Some(rect));
    }

    #[test]
    fn test_job_set_from_row() {
        let row = ConfigRow {
            entity_id: "VNM".to_string(),
            cells: vec![
                "1,A1,0,0,100,50".to_string(),
                String::new(),
                "x,A1,0,0,100".to_string(),
                "2,B2,0,0,100,50".to_string(),
                "1,C3,0,60,100,90".to_string(),
            ],
        };

        let set = EntityJobSet::from_row(&row);
        assert_eq!(set.slots.len(), 4);
        assert_eq!(set.malformed_count(), 1);

        let columns: Vec<usize> = set.slots.iter().map(|s| s.column).collect();
        assert_eq!(columns, vec![2, 4, 5, 6]);

        assert_eq!(set.jobs().count(), 3);
        assert_eq!(set.distinct_pages(), vec![1, 2]);
    }
}
