//! Streaming reader for LAMMPS-style text dump files.
//!
//! ```text
//! ITEM: TIMESTEP
//! 100
//! ITEM: NUMBER OF ATOMS
//! 2
//! ITEM: BOX BOUNDS pp pp pp
//! 0.0 10.0
//! 0.0 10.0
//! 0.0 10.0
//! ITEM: ATOMS id type x y z
//! 1 1 0.0 0.0 0.0
//! 2 1 1.5 1.5 0.0
//! ```
//!
//! Blocks are yielded one at a time, so only one snapshot is held in memory.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::str::FromStr;

use structure_common::{Atom, PeriodicBox, Timestep, Vec3};
use crate::error::ParseError;

const TIMESTEP: &str = "ITEM: TIMESTEP";
const NUMBER_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
const BOX_BOUNDS: &str = "ITEM: BOX BOUNDS";
const ATOMS: &str = "ITEM: ATOMS";
const ITEM: &str = "ITEM:";

/// Field positions of one `ITEM: ATOMS` header.
#[derive(Debug, Clone, PartialEq)]
struct AtomColumns {
    id: usize,
    coords: [usize; 3],
    /// Coordinates are fractions of the box (`xs ys zs`).
    scaled: bool,
    count: usize,
}

impl AtomColumns {
    fn parse(header: &str, line: usize) -> Result<Self, ParseError> {
        let names: Vec<&str> = header.split_whitespace().collect();
        let find = |name: &str| names.iter().position(|n| *n == name);

        let id = find("id").ok_or(ParseError::MissingColumn { line, column: "id" })?;
        let (coords, scaled) = match (find("x"), find("y"), find("z")) {
            (Some(x), Some(y), Some(z)) => ([x, y, z], false),
            _ => match (find("xs"), find("ys"), find("zs")) {
                (Some(x), Some(y), Some(z)) => ([x, y, z], true),
                _ => match (find("xu"), find("yu"), find("zu")) {
                    (Some(x), Some(y), Some(z)) => ([x, y, z], false),
                    _ => return Err(ParseError::MissingColumn { line, column: "x y z" }),
                },
            },
        };
        Ok(Self { id, coords, scaled, count: names.len() })
    }
}

fn parse_field<T: FromStr>(value: &str, line: usize, what: &'static str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::InvalidNumber { line, what, value: value.to_string() })
}

/// Parses a coordinate or box bound; `nan` and `inf` are rejected.
fn parse_finite(value: &str, line: usize, what: &'static str) -> Result<f64, ParseError> {
    let v: f64 = parse_field(value, line, what)?;
    if !v.is_finite() {
        return Err(ParseError::InvalidNumber { line, what, value: value.to_string() });
    }
    Ok(v)
}

/// Iterator over the timesteps of a dump file.
///
/// Stops after the first error; a malformed file is never partially skipped.
pub struct DumpReader<R> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<(usize, String)>,
    last_box: Option<PeriodicBox>,
    finished: bool,
}

impl DumpReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0, pending: None, last_box: None, finished: false }
    }

    /// Next meaningful line, trimmed. Blank and `#` lines are skipped.
    fn next_line(&mut self) -> Result<Option<(usize, String)>, ParseError> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        for raw in self.lines.by_ref() {
            let raw = raw?;
            self.line_no += 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Ok(Some((self.line_no, line.to_string())));
        }
        Ok(None)
    }

    fn expect_line(&mut self, what: &'static str) -> Result<(usize, String), ParseError> {
        self.next_line()?.ok_or(ParseError::Truncated(what))
    }

    fn read_box(&mut self, flags: &str, header_line: usize) -> Result<PeriodicBox, ParseError> {
        if !flags.split_whitespace().take(3).all(|f| f == "pp") {
            log::warn!(
                "line {}: box boundary flags '{}' are not fully periodic; treating the box as periodic",
                header_line, flags
            );
        }
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for axis in 0..3 {
            let (line, text) = self.expect_line("box bounds")?;
            let fields: Vec<&str> = text.split_whitespace().collect();
            // triclinic boxes carry a third tilt field, which is ignored
            if fields.len() < 2 {
                return Err(ParseError::Unexpected { line, expected: "'<min> <max>' box bounds", found: text });
            }
            lo[axis] = parse_finite(fields[0], line, "box bound")?;
            hi[axis] = parse_finite(fields[1], line, "box bound")?;
        }
        Ok(PeriodicBox::from_bounds(Vec3::from_array(lo), Vec3::from_array(hi)))
    }

    fn read_timestep(&mut self) -> Result<Option<Timestep>, ParseError> {
        let (line, text) = match self.next_line()? {
            Some(l) => l,
            None => return Ok(None),
        };
        if text != TIMESTEP {
            return Err(ParseError::Unexpected { line, expected: TIMESTEP, found: text });
        }
        let (line, text) = self.expect_line("timestep id")?;
        let id: u64 = parse_field(&text, line, "timestep id")?;

        let mut declared: Option<usize> = None;
        let mut periodic_box: Option<PeriodicBox> = None;
        let columns = loop {
            let (line, text) = self.expect_line("ITEM: ATOMS section")?;
            if text == NUMBER_OF_ATOMS {
                let (line, text) = self.expect_line("number of atoms")?;
                declared = Some(parse_field(&text, line, "number of atoms")?);
            } else if let Some(flags) = text.strip_prefix(BOX_BOUNDS) {
                periodic_box = Some(self.read_box(flags, line)?);
            } else if let Some(header) = text.strip_prefix(ATOMS) {
                break AtomColumns::parse(header, line)?;
            } else if text == TIMESTEP {
                return Err(ParseError::Unexpected { line, expected: ATOMS, found: text });
            } else if text.starts_with(ITEM) {
                // sections such as ITEM: UNITS or ITEM: TIME are not needed
                log::debug!("line {}: skipping section '{}'", line, text);
                while let Some((next_no, next)) = self.next_line()? {
                    if next.starts_with(ITEM) {
                        self.pending = Some((next_no, next));
                        break;
                    }
                }
            } else {
                return Err(ParseError::Unexpected { line, expected: "an ITEM: marker", found: text });
            }
        };

        let periodic_box = match periodic_box.or(self.last_box) {
            Some(b) => b,
            None => return Err(ParseError::MissingBox { line: self.line_no, timestep: id }),
        };
        self.last_box = Some(periodic_box);

        let mut timestep = Timestep::new(id, periodic_box);
        timestep.atoms.reserve(declared.unwrap_or(0));
        let mut seen = HashSet::with_capacity(declared.unwrap_or(0));
        while let Some((line, text)) = self.next_line()? {
            if text.starts_with(ITEM) {
                self.pending = Some((line, text));
                break;
            }
            let fields: Vec<&str> = text.split_whitespace().collect();
            if fields.len() != columns.count {
                return Err(ParseError::FieldCount { line, expected: columns.count, found: fields.len() });
            }
            let atom_id: u64 = parse_field(fields[columns.id], line, "atom id")?;
            let mut coords = [0.0; 3];
            for (value, &col) in coords.iter_mut().zip(&columns.coords) {
                *value = parse_finite(fields[col], line, "coordinate")?;
            }
            let mut position = Vec3::from_array(coords);
            if columns.scaled {
                position = periodic_box.fractional_to_cartesian(position);
            }
            if !seen.insert(atom_id) {
                return Err(ParseError::DuplicateAtom { line, timestep: id, id: atom_id });
            }
            timestep.atoms.push(Atom { id: atom_id, position });
        }

        if let Some(n) = declared {
            if n != timestep.atoms.len() {
                log::warn!(
                    "Timestep {}: header declares {} atoms, {} rows were read",
                    id, n, timestep.atoms.len()
                );
            }
        }
        log::debug!("Parsed timestep {} with {} atoms", id, timestep.atoms.len());
        Ok(Some(timestep))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<Timestep, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_timestep() {
            Ok(Some(ts)) => Some(Ok(ts)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn read_all(text: &str) -> Result<Vec<Timestep>, ParseError> {
        DumpReader::new(text.as_bytes()).collect()
    }

    const TWO_BLOCKS: &str = "\
# produced by a test
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
2
ITEM: BOX BOUNDS pp pp pp
-5.0 5.0
0.0 10.0
0.0 20.0
ITEM: ATOMS id type x y z
1 1 0.0 1.0 2.0
2 1 3.0 4.0 5.0

ITEM: TIMESTEP
100
ITEM: NUMBER OF ATOMS
1
ITEM: ATOMS id type x y z
7 2 -1.0 -2.0 -3.0
";

    #[test]
    fn reads_blocks_and_reuses_box() {
        let steps = read_all(TWO_BLOCKS).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, 0);
        assert_eq!(steps[0].periodic_box.lengths, Vec3::new(10.0, 10.0, 20.0));
        assert_eq!(steps[0].atoms[1], Atom { id: 2, position: Vec3::new(3.0, 4.0, 5.0) });
        assert_eq!(steps[1].id, 100);
        assert_eq!(steps[1].periodic_box, steps[0].periodic_box);
        assert_eq!(steps[1].atoms, vec![Atom { id: 7, position: Vec3::new(-1.0, -2.0, -3.0) }]);
    }

    #[test]
    fn scaled_coordinates_are_converted() {
        let text = "\
ITEM: TIMESTEP
5
ITEM: BOX BOUNDS pp pp pp
-2.0 2.0
0.0 8.0
1.0 3.0
ITEM: ATOMS id type xs ys zs
3 1 0.5 0.25 1.0
";
        let steps = read_all(text).unwrap();
        let p = steps[0].atoms[0].position;
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn column_order_comes_from_header() {
        let text = "\
ITEM: TIMESTEP
1
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS type x y z id c_pe
1 1.0 2.0 3.0 42 -3.9
";
        let steps = read_all(text).unwrap();
        assert_eq!(steps[0].atoms[0], Atom { id: 42, position: Vec3::new(1.0, 2.0, 3.0) });
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let text = "\
ITEM: TIMESTEP
1
ITEM: UNITS
metal
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type x y z
1 1 1.0 2.0 3.0
";
        assert_eq!(read_all(text).unwrap()[0].atoms.len(), 1);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let text = TWO_BLOCKS.replace("2 1 3.0 4.0 5.0", "2 1 3.0 4.0");
        match read_all(&text) {
            Err(ParseError::FieldCount { line, expected: 5, found: 4 }) => assert_eq!(line, 12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_numeric_coordinate_is_rejected() {
        let text = TWO_BLOCKS.replace("3.0 4.0 5.0", "3.0 four 5.0");
        assert!(matches!(
            read_all(&text),
            Err(ParseError::InvalidNumber { what: "coordinate", .. })
        ));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let text = TWO_BLOCKS.replace("3.0 4.0 5.0", "3.0 nan 5.0");
        match read_all(&text) {
            Err(ParseError::InvalidNumber { line, what, value }) => {
                assert_eq!((line, what, value.as_str()), (12, "coordinate", "nan"));
            }
            other => panic!("expected an invalid coordinate, got {:?}", other),
        }

        let text = TWO_BLOCKS.replace("0.0 20.0", "0.0 inf");
        assert!(matches!(
            read_all(&text),
            Err(ParseError::InvalidNumber { line: 9, what: "box bound", .. })
        ));
    }

    #[test]
    fn missing_marker_is_rejected() {
        let text = TWO_BLOCKS.replacen("ITEM: TIMESTEP\n", "", 1);
        assert!(matches!(
            read_all(&text),
            Err(ParseError::Unexpected { line: 2, expected: TIMESTEP, .. })
        ));
    }

    #[test]
    fn first_block_needs_a_box() {
        let text = "ITEM: TIMESTEP\n3\nITEM: ATOMS id type x y z\n1 1 0 0 0\n";
        assert!(matches!(read_all(text), Err(ParseError::MissingBox { timestep: 3, .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let text = TWO_BLOCKS.replace("2 1 3.0 4.0 5.0", "1 1 3.0 4.0 5.0");
        assert!(matches!(read_all(&text), Err(ParseError::DuplicateAtom { id: 1, timestep: 0, .. })));
    }

    #[test]
    fn truncated_block_is_rejected() {
        let text = "ITEM: TIMESTEP\n3\nITEM: BOX BOUNDS pp pp pp\n0 1\n";
        assert!(matches!(read_all(text), Err(ParseError::Truncated("box bounds"))));
    }

    #[test]
    fn reader_stops_after_error() {
        let text = TWO_BLOCKS.replace("7 2 -1.0 -2.0 -3.0", "7 2 x -2.0 -3.0");
        let mut reader = DumpReader::new(text.as_bytes());
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn declared_count_mismatch_is_tolerated() {
        let text = TWO_BLOCKS.replace("ITEM: NUMBER OF ATOMS\n2", "ITEM: NUMBER OF ATOMS\n3");
        assert_eq!(read_all(&text).unwrap()[0].atoms.len(), 2);
    }
}
