//! Flat-file connector.
//!
//! Every configured table is backed by one CSV, JSON Lines or JSON file. Queries are limited to
//! `SELECT * FROM table` and `SELECT col, ... FROM table`; the file is read with a streaming
//! cursor that is reused while chunks are requested in order, so a sequential extraction reads
//! each file once.

use async_trait::async_trait;
use catalog_config::shared::{FileEncoding, FileFormat, FileSourceConfig, SourceType};
use encoding_rs::WINDOWS_1252;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::connectors::base::Connector;
use crate::connectors::security::{TableAllowList, Token, tokenize};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::Row;
use crate::{bail, etl_error};

const UNSUPPORTED_QUERY: &str = "Flat-file sources only support `SELECT columns FROM table`";

/// A configured table and the file backing it.
#[derive(Debug, Clone)]
struct FileTable {
    name: String,
    path: PathBuf,
    format: FileFormat,
}

#[derive(Debug, Clone, Copy)]
struct ReadOptions {
    delimiter: u8,
    has_header: bool,
    encoding: FileEncoding,
}

/// Parsed form of a flat-file query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileQuery {
    table: String,
    /// Requested columns, `None` for `*`.
    columns: Option<Vec<String>>,
}

/// Parses `SELECT * FROM t` or `SELECT a, t.b, "c" FROM t`.
fn parse_file_query(query: &str) -> EtlResult<FileQuery> {
    let mut tokens = tokenize(query)?;
    while tokens.last() == Some(&Token::Symbol(';')) {
        tokens.pop();
    }

    let unsupported = || etl_error!(ErrorKind::SourceQueryFailed, UNSUPPORTED_QUERY, query.to_owned());

    let mut tokens = tokens.into_iter().peekable();
    if tokens.next() != Some(Token::Word("SELECT".to_owned())) {
        return Err(unsupported());
    }

    let mut columns = Vec::new();
    let mut qualifiers = Vec::new();
    if tokens.peek() == Some(&Token::Symbol('*')) {
        tokens.next();
    } else {
        loop {
            let first = identifier(tokens.next()).ok_or_else(unsupported)?;
            if tokens.peek() == Some(&Token::Symbol('.')) {
                tokens.next();
                let column = identifier(tokens.next()).ok_or_else(unsupported)?;
                qualifiers.push(first);
                columns.push(column);
            } else {
                columns.push(first);
            }

            if tokens.peek() == Some(&Token::Symbol(',')) {
                tokens.next();
                continue;
            }
            break;
        }
    }

    if tokens.next() != Some(Token::Word("FROM".to_owned())) {
        return Err(unsupported());
    }
    let table = identifier(tokens.next()).ok_or_else(unsupported)?;
    if tokens.next().is_some() {
        return Err(unsupported());
    }

    if qualifiers
        .iter()
        .any(|qualifier| !qualifier.eq_ignore_ascii_case(&table))
    {
        return Err(unsupported());
    }

    Ok(FileQuery {
        table,
        columns: (!columns.is_empty()).then_some(columns),
    })
}

fn identifier(token: Option<Token>) -> Option<String> {
    match token {
        Some(Token::Word(word)) => Some(word),
        Some(Token::Quoted(name)) => Some(name),
        _ => None,
    }
}

fn decode(bytes: &[u8], encoding: FileEncoding) -> EtlResult<String> {
    match encoding {
        FileEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(err) => bail!(
                ErrorKind::DeserializationError,
                "File content is not valid UTF-8",
                source: err
            ),
        },
        FileEncoding::Latin1 => Ok(WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0
            .into_owned()),
    }
}

fn json_object(value: Value, line: usize) -> EtlResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        _ => bail!(
            ErrorKind::DeserializationError,
            "File row is not a JSON object",
            format!("row {line}")
        ),
    }
}

type RowIter = Box<dyn Iterator<Item = EtlResult<Row>> + Send>;

fn open_csv(table: &FileTable, options: ReadOptions) -> EtlResult<RowIter> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .from_path(&table.path)?;

    let headers = if options.has_header {
        let headers = reader
            .byte_headers()?
            .iter()
            .map(|header| decode(header, options.encoding).map(|header| header.trim().to_owned()))
            .collect::<EtlResult<Vec<_>>>()?;
        Some(headers)
    } else {
        None
    };

    let encoding = options.encoding;
    let rows = reader.into_byte_records().map(move |record| {
        let record = record?;
        let mut row = Row::new();
        for (index, field) in record.iter().enumerate() {
            let name = match &headers {
                Some(headers) => match headers.get(index) {
                    Some(name) => name.clone(),
                    None => bail!(
                        ErrorKind::DeserializationError,
                        "File row has more fields than the header",
                        format!("{} fields", record.len())
                    ),
                },
                None => format!("column_{}", index + 1),
            };
            row.insert(name, Value::String(decode(field, encoding)?));
        }

        Ok(row)
    });

    Ok(Box::new(rows))
}

fn open_json_lines(table: &FileTable, options: ReadOptions) -> EtlResult<RowIter> {
    let reader = BufReader::new(File::open(&table.path)?);
    let encoding = options.encoding;

    let rows = reader
        .split(b'\n')
        .enumerate()
        .filter_map(move |(index, line)| {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(EtlError::from(err))),
            };
            let line = match decode(&line, encoding) {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            if line.trim().is_empty() {
                return None;
            }

            Some(
                serde_json::from_str(line.trim())
                    .map_err(EtlError::from)
                    .and_then(|value| json_object(value, index + 1)),
            )
        });

    Ok(Box::new(rows))
}

fn open_json(table: &FileTable, options: ReadOptions) -> EtlResult<RowIter> {
    let content = decode(&std::fs::read(&table.path)?, options.encoding)?;
    let values: Vec<Value> = serde_json::from_str(&content)?;

    let rows = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| json_object(value, index + 1));

    Ok(Box::new(rows))
}

/// Restricts `row` to `columns`, matching names case-insensitively.
///
/// Delimited files have a fixed header, so an unknown column is an error. JSON rows may omit
/// keys, which then stay absent.
fn project(mut row: Row, columns: &[String], strict: bool) -> EtlResult<Row> {
    let mut projected = Row::new();
    for column in columns {
        let key = row
            .keys()
            .find(|key| key.eq_ignore_ascii_case(column))
            .cloned();

        match key {
            Some(key) => {
                if let Some(value) = row.remove(&key) {
                    projected.insert(key, value);
                }
            }
            None if strict => bail!(
                ErrorKind::SourceQueryFailed,
                "Column does not exist in the file",
                column.clone()
            ),
            None => {}
        }
    }

    Ok(projected)
}

/// Streaming position in the result of one query.
struct FileCursor {
    query: String,
    position: usize,
    rows: RowIter,
}

impl fmt::Debug for FileCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCursor")
            .field("query", &self.query)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl FileCursor {
    fn open(
        query: String,
        table: &FileTable,
        columns: Option<Vec<String>>,
        options: ReadOptions,
        offset: usize,
    ) -> EtlResult<Self> {
        let rows = match table.format {
            FileFormat::Csv => open_csv(table, options)?,
            FileFormat::JsonLines => open_json_lines(table, options)?,
            FileFormat::Json => open_json(table, options)?,
        };

        let rows: RowIter = match columns {
            Some(columns) => {
                let strict = table.format == FileFormat::Csv;
                Box::new(rows.map(move |row| row.and_then(|row| project(row, &columns, strict))))
            }
            None => rows,
        };

        let mut cursor = FileCursor {
            query,
            position: 0,
            rows,
        };
        while cursor.position < offset {
            match cursor.rows.next() {
                Some(row) => {
                    row?;
                    cursor.position += 1;
                }
                None => break,
            }
        }

        Ok(cursor)
    }

    fn next_rows(&mut self, size: usize) -> EtlResult<Vec<Row>> {
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.rows.next() {
                Some(row) => rows.push(row?),
                None => break,
            }
        }
        self.position += rows.len();

        Ok(rows)
    }
}

/// Connector reading catalog tables from flat files.
#[derive(Debug)]
pub struct FileConnector {
    name: String,
    tables: BTreeMap<String, FileTable>,
    options: ReadOptions,
    allow_list: TableAllowList,
    connected: bool,
    cursor: Option<FileCursor>,
}

impl FileConnector {
    pub fn new(name: impl Into<String>, config: &FileSourceConfig) -> EtlResult<Self> {
        config.validate()?;

        let mut tables = BTreeMap::new();
        for (table, path) in &config.tables {
            let Some(format) = config.format_for(path) else {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Cannot infer the format of a source file",
                    path.display()
                );
            };

            tables.insert(
                table.to_uppercase(),
                FileTable {
                    name: table.clone(),
                    path: path.clone(),
                    format,
                },
            );
        }

        Ok(Self {
            name: name.into(),
            allow_list: TableAllowList::new(config.tables.keys(), None),
            tables,
            options: ReadOptions {
                // Validation guarantees an ASCII delimiter.
                delimiter: config.delimiter as u8,
                has_header: config.has_header,
                encoding: config.encoding,
            },
            connected: false,
            cursor: None,
        })
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> EtlResult<()> {
        if self.connected {
            return Ok(());
        }

        for table in self.tables.values() {
            let metadata = tokio::fs::metadata(&table.path).await.map_err(|err| {
                etl_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Source file is not readable",
                    format!("{} ({})", table.path.display(), table.name),
                    source: err
                )
            })?;

            if !metadata.is_file() {
                bail!(
                    ErrorKind::SourceConnectionFailed,
                    "Source path is not a file",
                    table.path.display()
                );
            }
        }

        self.connected = true;
        info!(source = %self.name, tables = self.tables.len(), "connected to flat files");

        Ok(())
    }

    async fn extract_chunk(
        &mut self,
        query: &str,
        params: &[Value],
        offset: usize,
        size: usize,
    ) -> EtlResult<Vec<Row>> {
        self.allow_list.check_query(query)?;

        if !self.connected {
            bail!(
                ErrorKind::InvalidState,
                "Connector is not connected",
                self.name.clone()
            );
        }

        if !params.is_empty() {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Flat-file sources do not support query parameters",
                format!("{} parameters given", params.len())
            );
        }

        let parsed = parse_file_query(query)?;
        let Some(table) = self.tables.get(&parsed.table.to_uppercase()).cloned() else {
            bail!(
                ErrorKind::SecurityViolation,
                "Query references a table outside the allow-list",
                parsed.table
            );
        };

        let reusable = self
            .cursor
            .take()
            .filter(|cursor| cursor.query == query && cursor.position == offset);
        if reusable.is_none() {
            debug!(source = %self.name, table = %table.name, offset, "opening file cursor");
        }

        let query = query.to_owned();
        let options = self.options;
        let (cursor, rows) = tokio::task::spawn_blocking(move || -> EtlResult<_> {
            let mut cursor = match reusable {
                Some(cursor) => cursor,
                None => FileCursor::open(query, &table, parsed.columns, options, offset)?,
            };
            let rows = cursor.next_rows(size)?;

            Ok((cursor, rows))
        })
        .await
        .map_err(|err| etl_error!(ErrorKind::IoError, "File reader task failed", source: err))??;

        self.cursor = Some(cursor);

        Ok(rows)
    }

    async fn close(&mut self) -> EtlResult<()> {
        self.cursor = None;
        if self.connected {
            self.connected = false;
            info!(source = %self.name, "closed flat-file source");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn config(table: &str, path: PathBuf) -> FileSourceConfig {
        FileSourceConfig {
            tables: BTreeMap::from([(table.to_owned(), path)]),
            format: None,
            delimiter: ',',
            has_header: true,
            encoding: FileEncoding::Utf8,
        }
    }

    #[test]
    fn only_single_table_projections_are_supported() {
        assert_eq!(
            parse_file_query("SELECT INVENTORY.part_number, \"Qty\" FROM INVENTORY;").unwrap(),
            FileQuery {
                table: "INVENTORY".to_owned(),
                columns: Some(vec!["PART_NUMBER".to_owned(), "Qty".to_owned()]),
            }
        );
        assert_eq!(
            parse_file_query("select * from inventory").unwrap().columns,
            None
        );

        for query in [
            "SELECT * FROM A LEFT JOIN B ON A.K = B.K",
            "SELECT * FROM INVENTORY WHERE quantity > 0",
            "SELECT B.x FROM INVENTORY",
            "SELECT COUNT(*) FROM INVENTORY",
        ] {
            assert_eq!(
                parse_file_query(query).unwrap_err().kind(),
                ErrorKind::SourceQueryFailed,
                "{query}"
            );
        }
    }

    #[tokio::test]
    async fn csv_chunks_are_read_with_a_single_cursor() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "inventory.csv",
            b"part_number,warehouse,quantity\nA-1,MAIN,3\nA-2,,7\nA-3,EAST,-2\n",
        );
        let mut connector = FileConnector::new("files", &config("INVENTORY", path)).unwrap();
        connector.connect().await.unwrap();

        let query = "SELECT INVENTORY.part_number, INVENTORY.quantity FROM INVENTORY";
        let first = connector.extract_chunk(query, &[], 0, 2).await.unwrap();
        let second = connector.extract_chunk(query, &[], 2, 2).await.unwrap();
        let third = connector.extract_chunk(query, &[], 4, 2).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].keys().collect::<Vec<_>>(), vec!["part_number", "quantity"]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["quantity"], Value::from("-2"));
        assert!(third.is_empty());

        // A fresh offset reopens the file.
        let again = connector.extract_chunk(query, &[], 1, 10).await.unwrap();
        assert_eq!(again[0]["part_number"], Value::from("A-2"));

        connector.close().await.unwrap();
        connector.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_csv_columns_are_query_errors() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "inventory.csv", b"part_number,quantity\nA-1,3\n");
        let mut connector = FileConnector::new("files", &config("INVENTORY", path)).unwrap();
        connector.connect().await.unwrap();

        let err = connector
            .extract_chunk("SELECT bin FROM INVENTORY", &[], 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
    }

    #[tokio::test]
    async fn latin1_json_lines_are_decoded() {
        let dir = TempDir::new().unwrap();
        let mut content = b"{\"part_number\": \"A-1\", \"description\": \"Caf".to_vec();
        content.push(0xE9);
        content.extend_from_slice(b"\"}\n\n{\"part_number\": \"A-2\"}\n");
        let path = write(&dir, "products.jsonl", &content);

        let mut config = config("PRODUCTS", path);
        config.encoding = FileEncoding::Latin1;
        let mut connector = FileConnector::new("files", &config).unwrap();
        connector.connect().await.unwrap();

        let rows = connector
            .extract("SELECT part_number, description FROM PRODUCTS", None, &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["description"], Value::from("Café"));
        assert!(!rows[1].contains_key("description"));
    }

    #[tokio::test]
    async fn missing_files_fail_to_connect_and_foreign_tables_are_rejected() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        let mut connector = FileConnector::new("files", &config("PRICING", missing)).unwrap();

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);

        let err = connector
            .extract_chunk("SELECT * FROM SECRETS", &[], 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);

        let err = connector
            .extract_chunk("SELECT * FROM PRICING", &[], 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
