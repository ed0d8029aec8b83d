// Reader for the CSV export of a Google-Forms-style election.
//
// Vote columns carry a 'Role [Candidate]' header and end with ']'; anything
// else (timestamp, email, free-text questions) is dropped. Cells hold the
// preference as 'P1', 'P2', ... or are left blank for no preference.

use std::fs::File;
use std::io;

use log::debug;
use snafu::prelude::*;

use stv_voting::Ballot;

use crate::tally::*;

/// The rank table of a single role, in input column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    pub role: String,
    pub candidates: Vec<String>,
    pub ballots: Vec<Ballot>,
}

/// Splits a vote column header into (role, candidate). Returns `None` for
/// non-vote columns.
pub fn split_header(column: &str) -> Option<(String, String)> {
    if !column.ends_with(']') {
        return None;
    }
    let (role, candidate) = column[..column.len() - 1].split_once(" [")?;
    Some((role.trim().to_string(), candidate.to_string()))
}

/// Parses one cell into a rank. 'P3' means rank 3; a bare integer is
/// accepted too; blank is no preference.
pub fn parse_cell(value: &str, lineno: usize) -> TallyResult<Option<u32>> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(None);
    }
    let digits = v
        .strip_prefix('P')
        .or_else(|| v.strip_prefix('p'))
        .unwrap_or(v);
    let rank = digits.parse::<u32>().ok().context(BadCellSnafu {
        value: value.to_string(),
        lineno,
    })?;
    Ok(Some(rank))
}

/// Reads the whole form export and splits it into one rank table per role,
/// in header order.
pub fn read_form_csv(path: &str) -> TallyResult<Vec<RoleTable>> {
    let f = File::open(path).context(CsvOpenSnafu {
        path: path.to_string(),
    })?;
    read_form(f)
}

pub fn read_form<R: io::Read>(input: R) -> TallyResult<Vec<RoleTable>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(input);
    let mut records = rdr.into_records();

    let header = records
        .next()
        .context(EmptyInputSnafu {})?
        .context(CsvLineSnafu { lineno: 1usize })?;
    debug!("read_form: header: {:?}", header);

    // (column index, role, candidate) for the vote columns, header order.
    let mut vote_columns: Vec<(usize, String, String)> = Vec::new();
    for (idx, column) in header.iter().enumerate() {
        match split_header(column) {
            Some((role, candidate)) => vote_columns.push((idx, role, candidate)),
            None => debug!("read_form: dropping non-vote column {:?}", column),
        }
    }
    ensure!(!vote_columns.is_empty(), NoVoteColumnsSnafu {});

    let mut tables: Vec<RoleTable> = Vec::new();
    // (column index, table index) for every vote column.
    let mut col_map: Vec<(usize, usize)> = Vec::new();
    for (col, role, candidate) in vote_columns.iter() {
        let table_idx = match tables.iter().position(|t| t.role == *role) {
            Some(i) => {
                tables[i].candidates.push(candidate.clone());
                i
            }
            None => {
                tables.push(RoleTable {
                    role: role.clone(),
                    candidates: vec![candidate.clone()],
                    ballots: Vec::new(),
                });
                tables.len() - 1
            }
        };
        col_map.push((*col, table_idx));
    }

    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineSnafu { lineno })?;
        debug!("read_form: line {}: {:?}", lineno, line);
        let mut rows: Vec<Vec<Option<u32>>> = tables.iter().map(|_| Vec::new()).collect();
        for (col, table_idx) in col_map.iter() {
            let cell = line.get(*col).context(CsvLineTooShortSnafu { lineno })?;
            rows[*table_idx].push(parse_cell(cell, lineno)?);
        }
        for (table_idx, ranks) in rows.into_iter().enumerate() {
            tables[table_idx].ballots.push(Ballot::new(ranks));
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_splitting() {
        assert_eq!(
            split_header("Sports Representative [Albert Einstein]"),
            Some((
                "Sports Representative".to_string(),
                "Albert Einstein".to_string()
            ))
        );
        assert_eq!(split_header("Timestamp"), None);
        assert_eq!(split_header("What is your email?"), None);
    }

    #[test]
    fn cell_parsing() {
        assert_eq!(parse_cell("P1", 2).unwrap(), Some(1));
        assert_eq!(parse_cell("p12", 2).unwrap(), Some(12));
        assert_eq!(parse_cell("3", 2).unwrap(), Some(3));
        assert_eq!(parse_cell("", 2).unwrap(), None);
        assert_eq!(parse_cell("  ", 2).unwrap(), None);
        assert!(parse_cell("first", 2).is_err());
    }

    #[test]
    fn reads_roles_and_ballots_from_a_form_export() {
        let data = "\
Timestamp,Chair [Alice],Chair [Bob],Secretary [Carol],Secretary [Dan]
2024-05-01,P1,P2,P2,P1
2024-05-01,P2,P1,,P1
2024-05-02,P1,,P1,
";
        let tables = read_form(data.as_bytes()).unwrap();
        assert_eq!(tables.len(), 2);

        let chair = &tables[0];
        assert_eq!(chair.role, "Chair");
        assert_eq!(chair.candidates, vec!["Alice", "Bob"]);
        assert_eq!(
            chair.ballots,
            vec![
                Ballot::new(vec![Some(1), Some(2)]),
                Ballot::new(vec![Some(2), Some(1)]),
                Ballot::new(vec![Some(1), None]),
            ]
        );

        let secretary = &tables[1];
        assert_eq!(secretary.role, "Secretary");
        assert_eq!(secretary.candidates, vec!["Carol", "Dan"]);
        assert_eq!(secretary.ballots.len(), 3);
    }

    #[test]
    fn rejects_inputs_without_vote_columns() {
        let data = "Timestamp,Name\n2024-05-01,x\n";
        assert!(read_form(data.as_bytes()).is_err());
    }
}
