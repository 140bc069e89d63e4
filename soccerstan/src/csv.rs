//! Utilities for working with CSV files.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Lines, Read, Write};
use std::ops::{Index, IndexMut};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::data::{RawRow, RawTable};

pub struct CsvWriter<W: Write = File> {
    writer: BufWriter<W>,
}
impl CsvWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let file = File::create(path)?;
        Ok(Self::wrap(file))
    }
}
impl<W: Write> CsvWriter<W> {
    pub fn wrap(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }

    pub fn append<R>(&mut self, record: R) -> Result<(), io::Error>
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let mut first = true;
        for datum in record.into_iter() {
            if first {
                first = false;
            } else {
                self.writer.write_all(b",")?;
            }
            self.writer.write_all(escape(datum.as_ref()).as_bytes())?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), io::Error> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> Result<W, io::Error> {
        self.writer.into_inner().map_err(|err| err.into_error())
    }
}

/// Team names may contain commas ("Brighton, Hove"), so such fields are quoted on output.
fn escape(datum: &str) -> Cow<str> {
    if datum.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", datum.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(datum)
    }
}

pub struct CsvReader<R: Read = File> {
    lines: Lines<BufReader<R>>,
}
impl CsvReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        Ok(Self::wrap(file))
    }
}
impl<R: Read> CsvReader<R> {
    pub fn wrap(inner: R) -> Self {
        let lines = BufReader::new(inner).lines();
        Self { lines }
    }

    pub fn read(&mut self) -> Option<Result<Vec<String>, io::Error>> {
        self.lines.next().map(|line| line.map(|line| split(&line)))
    }
}

impl<R: Read> Iterator for CsvReader<R> {
    type Item = Result<Vec<String>, io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read()
    }
}

/// Splits a line on commas, honouring double-quoted fields. A quote opens a quoted section only
/// at the start of a field; elsewhere in an unquoted field it is taken literally.
fn split(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = vec![];
    let mut field = String::new();
    let mut quoted = false;
    let mut started = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if !started => {
                quoted = true;
                started = true;
            }
            ',' if !quoted => {
                fields.push(std::mem::take(&mut field));
                started = false;
            }
            _ => {
                field.push(c);
                started = true;
            }
        }
    }
    fields.push(field);
    fields
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    items: Vec<Cow<'static, str>>,
}
impl Record {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut items = Vec::with_capacity(capacity);
        items.resize_with(capacity, || Cow::Borrowed(""));
        Self { items }
    }

    pub fn with_values<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        let items = values
            .into_iter()
            .map(|value| Cow::Owned(value.to_string()))
            .collect();
        Self { items }
    }

    pub fn set(&mut self, ordinal: impl Into<usize>, value: impl ToString) {
        self.items[ordinal.into()] = Cow::Owned(value.to_string())
    }
}

impl IntoIterator for Record {
    type Item = Cow<'static, str>;
    type IntoIter = std::vec::IntoIter<Cow<'static, str>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<I: Into<usize>> Index<I> for Record {
    type Output = Cow<'static, str>;

    fn index(&self, index: I) -> &Self::Output {
        &self.items[index.into()]
    }
}

impl<I: Into<usize>> IndexMut<I> for Record {
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.items[index.into()]
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("empty file: no header row")]
    NoHeader,

    #[error("no column for {field} (expected one of {aliases:?})")]
    MissingColumn {
        field: &'static str,
        aliases: &'static [&'static str],
    },

    #[error("line {line} has {actual} fields, expected at least {expected}")]
    ShortRow {
        line: usize,
        actual: usize,
        expected: usize,
    },
}

const HOME_TEAM: (&str, &[&str]) = ("home_team", &["HomeTeam", "home_team", "Home"]);
const AWAY_TEAM: (&str, &[&str]) = ("away_team", &["AwayTeam", "away_team", "Away"]);
const HOME_GOALS: (&str, &[&str]) = ("home_goals", &["FTHG", "home_goals", "HG"]);
const AWAY_GOALS: (&str, &[&str]) = ("away_goals", &["FTAG", "away_goals", "AG"]);

fn locate(header: &[String], (field, aliases): (&'static str, &'static [&'static str])) -> Result<usize, ReadError> {
    aliases
        .iter()
        .find_map(|alias| header.iter().position(|name| name.trim() == *alias))
        .ok_or(ReadError::MissingColumn { field, aliases })
}

fn cell(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Reads a match table in the football-data.co.uk layout, also accepting snake_case headers.
/// Empty goal cells are read as missing; rows with no content at all are skipped.
pub fn read_table<R: Read>(reader: CsvReader<R>) -> Result<RawTable, ReadError> {
    let mut lines = reader.enumerate();
    let mut header = match lines.next() {
        None => return Err(ReadError::NoHeader),
        Some((_, header)) => header?,
    };
    if let Some(first) = header.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    let columns = [
        locate(&header, HOME_TEAM)?,
        locate(&header, AWAY_TEAM)?,
        locate(&header, HOME_GOALS)?,
        locate(&header, AWAY_GOALS)?,
    ];
    let expected = columns.iter().max().map(|&max| max + 1).unwrap_or_default();

    let mut rows = vec![];
    for (index, fields) in lines {
        let fields = fields?;
        if fields.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if fields.len() < expected {
            return Err(ReadError::ShortRow {
                line: index + 1,
                actual: fields.len(),
                expected,
            });
        }
        let [home_team, away_team, home_goals, away_goals] = columns.map(|column| &fields[column]);
        rows.push(RawRow {
            home_team: home_team.trim().to_string(),
            away_team: away_team.trim().to_string(),
            home_goals: cell(home_goals),
            away_goals: cell(away_goals),
        });
    }
    debug!("read {} rows", rows.len());
    Ok(RawTable { rows })
}

/// Reads a match table from the CSV file at `path`.
pub fn read_table_file(path: impl AsRef<Path>) -> Result<RawTable, ReadError> {
    read_table(CsvReader::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_str(text: &str) -> Result<RawTable, ReadError> {
        read_table(CsvReader::wrap(text.as_bytes()))
    }

    #[test]
    fn football_data_layout() {
        let table = read_str(
            "Div,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR\n\
             E0,13/08/2021,Brentford,Arsenal,2,0,H\n\
             E0,14/08/2021,Man United,Leeds,5,1,H\n\
             E0,21/05/2022,Leeds,Brentford,,,\n",
        )
        .unwrap();
        assert_eq!(
            vec![
                RawRow::played("Brentford", "Arsenal", 2, 0),
                RawRow::played("Man United", "Leeds", 5, 1),
                RawRow::unplayed("Leeds", "Brentford"),
            ],
            table.rows
        );
    }

    #[test]
    fn snake_case_layout_with_crlf_and_bom() {
        let table = read_str("\u{feff}home_team,away_team,home_goals,away_goals\r\nA,B,1,0\r\n").unwrap();
        assert_eq!(vec![RawRow::played("A", "B", 1, 0)], table.rows);
    }

    #[test]
    fn skips_blank_rows() {
        let table = read_str("HomeTeam,AwayTeam,FTHG,FTAG\n,,,\nA,B,1,1\n\n").unwrap();
        assert_eq!(vec![RawRow::played("A", "B", 1, 1)], table.rows);
    }

    #[test]
    fn quoted_fields() {
        let table = read_str("HomeTeam,AwayTeam,FTHG,FTAG\n\"Brighton, Hove\",\"The \"\"Gunners\"\"\",1,2\n").unwrap();
        assert_eq!(
            vec![RawRow::played("Brighton, Hove", "The \"Gunners\"", 1, 2)],
            table.rows
        );
    }

    #[test]
    fn quote_inside_unquoted_field_is_literal() {
        let table = read_str("HomeTeam,AwayTeam,FTHG,FTAG\nO\"Brien,B,1,0\nC,D\"\",2,2\n").unwrap();
        assert_eq!(
            vec![
                RawRow::played("O\"Brien", "B", 1, 0),
                RawRow::played("C", "D\"\"", 2, 2),
            ],
            table.rows
        );
    }

    #[test]
    fn missing_column() {
        let err = read_str("HomeTeam,AwayTeam,FTHG\nA,B,1\n").unwrap_err();
        assert_eq!(
            "no column for away_goals (expected one of [\"FTAG\", \"away_goals\", \"AG\"])",
            err.to_string()
        );
    }

    #[test]
    fn short_row() {
        let err = read_str("HomeTeam,AwayTeam,FTHG,FTAG\nA,B,1,1\nA,B\n").unwrap_err();
        assert!(matches!(err, ReadError::ShortRow { line: 3, actual: 2, expected: 4 }), "{err:?}");
    }

    #[test]
    fn no_header() {
        assert!(matches!(read_str("").unwrap_err(), ReadError::NoHeader));
    }

    #[test]
    fn write_escapes() {
        let mut writer = CsvWriter::wrap(vec![]);
        writer.append(["plain", "with,comma", "with\"quote"]).unwrap();
        writer.append(Record::with_values([1, 2])).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(
            "plain,\"with,comma\",\"with\"\"quote\"\n1,2\n",
            String::from_utf8(bytes).unwrap()
        );
    }
}
