// ABOUTME: Archive Codec — thin ZIP writer/reader facade with a fixed dump member layout
// ABOUTME: schema.sql, sequences.sql, then data/<table>.csv per table, in that order

use crate::request::Compression;
use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const SCHEMA_MEMBER: &str = "dump/schema.sql";
pub const SEQUENCES_MEMBER: &str = "dump/sequences.sql";

pub fn data_member(table: &str) -> String {
    format!("dump/data/{table}.csv")
}

fn compression_method(compression: Compression) -> CompressionMethod {
    match compression {
        Compression::Stored => CompressionMethod::Stored,
        Compression::Deflated => CompressionMethod::Deflated,
        Compression::Bzip2 => CompressionMethod::Bzip2,
        Compression::Zstd => CompressionMethod::Zstd,
    }
}

/// Append-only ZIP writer. Entries must be added in the fixed member order
/// from SPEC_FULL.md §4.2; this type does not enforce that order itself —
/// the dump orchestrator is responsible for calling the methods in sequence.
pub struct ArchiveWriter<W: Write + std::io::Seek> {
    zip: ZipWriter<W>,
    method: CompressionMethod,
}

impl<W: Write + std::io::Seek> ArchiveWriter<W> {
    pub fn new(sink: W, compression: Compression) -> Self {
        ArchiveWriter {
            zip: ZipWriter::new(sink),
            method: compression_method(compression),
        }
    }

    fn options(&self) -> FileOptions<()> {
        let options: FileOptions<()> = FileOptions::default().compression_method(self.method);
        options
    }

    pub fn write_schema(&mut self, sql: &[u8]) -> Result<()> {
        self.write_member(SCHEMA_MEMBER, sql)
    }

    pub fn write_sequences(&mut self, sql: &[u8]) -> Result<()> {
        self.write_member(SEQUENCES_MEMBER, sql)
    }

    pub fn write_table_csv(&mut self, table: &str, csv: &[u8]) -> Result<()> {
        self.write_member(&data_member(table), csv)
    }

    fn write_member(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, self.options())
            .with_context(|| format!("failed to start archive member '{name}'"))?;
        self.zip
            .write_all(contents)
            .with_context(|| format!("failed to write archive member '{name}'"))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.zip.finish().context("failed to finalize archive")
    }
}

/// Random-access ZIP reader over the fixed dump member layout.
pub struct ArchiveReader<R: Read + std::io::Seek> {
    zip: ZipArchive<R>,
}

impl<R: Read + std::io::Seek> ArchiveReader<R> {
    pub fn new(source: R) -> Result<Self> {
        let zip = ZipArchive::new(source).context("failed to open archive")?;
        Ok(ArchiveReader { zip })
    }

    pub fn has_schema(&self) -> bool {
        self.zip.index_for_name(SCHEMA_MEMBER).is_some()
    }

    pub fn read_schema(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_member_if_present(SCHEMA_MEMBER)
    }

    pub fn read_sequences(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_member_if_present(SEQUENCES_MEMBER)
    }

    pub fn read_table_csv(&mut self, table: &str) -> Result<Vec<u8>> {
        self.read_member(&data_member(table))
    }

    /// Table names for every `dump/data/*.csv` member, in archive order —
    /// this is the replay order the load orchestrator uses.
    pub fn data_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .zip
            .file_names()
            .filter_map(|name| {
                name.strip_prefix("dump/data/")
                    .and_then(|rest| rest.strip_suffix(".csv"))
                    .map(str::to_string)
            })
            .collect();
        tables.sort();
        tables
    }

    fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self
            .zip
            .by_name(name)
            .with_context(|| format!("archive member '{name}' not found"))?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .with_context(|| format!("failed to read archive member '{name}'"))?;
        Ok(buf)
    }

    fn read_member_if_present(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        if self.zip.index_for_name(name).is_none() {
            return Ok(None);
        }
        Ok(Some(self.read_member(name)?))
    }
}

pub fn open_reader(path: &Path) -> Result<ArchiveReader<std::io::BufReader<std::fs::File>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open archive '{}'", path.display()))?;
    ArchiveReader::new(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_schema_sequences_and_table_data() {
        let buf = Cursor::new(Vec::new());
        let mut writer = ArchiveWriter::new(buf, Compression::Stored);
        writer.write_schema(b"CREATE TABLE employees (id INT);").unwrap();
        writer.write_sequences(b"SELECT setval('employees_id_seq', 1);").unwrap();
        writer.write_table_csv("employees", b"id,name\n1,alice\n").unwrap();
        writer.write_table_csv("groups", b"id,name\n1,eng\n").unwrap();
        let buf = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(buf).unwrap();
        assert!(reader.has_schema());
        assert_eq!(
            reader.read_schema().unwrap().unwrap(),
            b"CREATE TABLE employees (id INT);"
        );
        assert_eq!(
            reader.read_sequences().unwrap().unwrap(),
            b"SELECT setval('employees_id_seq', 1);"
        );
        assert_eq!(reader.read_table_csv("employees").unwrap(), b"id,name\n1,alice\n");
        assert_eq!(reader.data_tables(), vec!["employees".to_string(), "groups".to_string()]);
    }

    #[test]
    fn missing_schema_reports_absent_not_error() {
        let buf = Cursor::new(Vec::new());
        let mut writer = ArchiveWriter::new(buf, Compression::Deflated);
        writer.write_table_csv("employees", b"id\n1\n").unwrap();
        let buf = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(buf).unwrap();
        assert!(!reader.has_schema());
        assert!(reader.read_schema().unwrap().is_none());
    }
}
