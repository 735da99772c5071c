//! Frame validation and splitting.
//!
//! A frame is one text message from the sensor board. Each line carries a tag
//! prefix naming the sensor it came from:
//!
//! ```text
//! MPU6050: ax=0.12 ay=-0.98 az=0.03
//! MPU6050: gx=1.2 gy=0.4 gz=-0.1
//! Bend Sensor: 512
//! ```
//!
//! Lines are partitioned into a primary (IMU) block and a secondary (flex sensor)
//! block. Anything else on the wire is dropped. A frame only becomes a
//! [`Reading`] when both blocks are non-empty; otherwise the parser reports
//! [`FrameRejection::Incomplete`] and nothing is persisted.
//!
//! Parsing is pure. The timestamp is supplied by the caller through
//! [`SensorBlocks::stamp`].

use chrono::NaiveDateTime;
use std::fmt;

/// Line prefix of the IMU (accelerometer/gyroscope) lines.
pub const PRIMARY_TAG: &str = "MPU6050";
/// Line prefix of the flex sensor lines.
pub const SECONDARY_TAG: &str = "Bend Sensor";

/// Wall-clock format used for the `Timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Characters that end a line: `\n`, `\r`, vertical tab, form feed, the
/// file/group/record separators, NEL and the Unicode line and paragraph
/// separators. `\r\n` yields an empty piece between the two, which is dropped.
fn is_line_boundary(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_line_boundary).filter(|line| !line.is_empty())
}

/// The two sensor groups a frame is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    /// The IMU (`MPU6050`) lines.
    Primary,
    /// The flex sensor (`Bend Sensor`) lines.
    Secondary,
}

impl fmt::Display for SensorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorGroup::Primary => write!(f, "primary"),
            SensorGroup::Secondary => write!(f, "secondary"),
        }
    }
}

/// Why a frame was not turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRejection {
    /// One or both tagged groups were absent.
    Incomplete {
        /// Groups with no tagged line, primary first.
        missing: Vec<SensorGroup>,
    },
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRejection::Incomplete { missing } => {
                let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                write!(f, "incomplete frame (missing {} block)", names.join(" and "))
            }
        }
    }
}

/// The validated, untimed content of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorBlocks {
    primary: String,
    secondary: String,
}

impl SensorBlocks {
    /// IMU lines joined with `\n`.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Flex sensor lines joined with `\n`.
    pub fn secondary(&self) -> &str {
        &self.secondary
    }

    /// Attach the arrival time and the raw frame, producing an immutable reading.
    pub fn stamp(self, at: NaiveDateTime, raw: impl Into<String>) -> Reading {
        Reading {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            primary: self.primary,
            secondary: self.secondary,
            frame: raw.into(),
        }
    }
}

/// One validated sensor reading, ready for the sinks.
///
/// Readings are consumed once by the Sink Writer and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    timestamp: String,
    primary: String,
    secondary: String,
    frame: String,
}

impl Reading {
    /// Formatted wall-clock time of arrival.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Content of the `MPU6050 Data` column.
    pub fn primary_block(&self) -> &str {
        &self.primary
    }

    /// Content of the `Flex Sensor Data` column.
    pub fn secondary_block(&self) -> &str {
        &self.secondary
    }

    /// The frame exactly as it arrived over the wire.
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Row cells in column order: timestamp, primary, secondary.
    pub fn cells(&self) -> [&str; 3] {
        [&self.timestamp, &self.primary, &self.secondary]
    }
}

/// Splits frames by line prefix.
#[derive(Debug, Clone)]
pub struct FrameParser {
    primary_tag: String,
    secondary_tag: String,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(PRIMARY_TAG, SECONDARY_TAG)
    }
}

impl FrameParser {
    /// Parser with custom line prefixes.
    pub fn new(primary_tag: impl Into<String>, secondary_tag: impl Into<String>) -> Self {
        Self {
            primary_tag: primary_tag.into(),
            secondary_tag: secondary_tag.into(),
        }
    }

    /// Partition `raw` into the two tagged blocks.
    ///
    /// Line order within a block is preserved and lines are joined with `\n`.
    /// Untagged lines are ignored, so garbage interleaved with tagged lines is
    /// harmless as long as both groups are present.
    pub fn parse(&self, raw: &str) -> Result<SensorBlocks, FrameRejection> {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();

        for line in split_lines(raw.trim()) {
            if line.starts_with(&self.primary_tag) {
                primary.push(line);
            } else if line.starts_with(&self.secondary_tag) {
                secondary.push(line);
            }
        }

        let mut missing = Vec::new();
        if primary.is_empty() {
            missing.push(SensorGroup::Primary);
        }
        if secondary.is_empty() {
            missing.push(SensorGroup::Secondary);
        }
        if !missing.is_empty() {
            return Err(FrameRejection::Incomplete { missing });
        }

        Ok(SensorBlocks {
            primary: primary.join("\n"),
            secondary: secondary.join("\n"),
        })
    }
}

/// Parse with the default `MPU6050` / `Bend Sensor` tags.
pub fn parse_frame(raw: &str) -> Result<SensorBlocks, FrameRejection> {
    FrameParser::default().parse(raw)
}
