use std::io::Write;

use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::ValueEnum;

use crate::command::Output;
use crate::error::Result;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Table,
    Csv,
}

pub fn write_batch<W: Write>(w: &mut W, batch: &RecordBatch, format: Format) -> Result<()> {
    match format {
        Format::Table => writeln!(w, "{}", pretty_format_batches(&[batch.clone()])?)?,
        Format::Csv => {
            let mut writer = WriterBuilder::new().with_header(true).build(w);
            writer.write(batch)?;
        }
    }

    Ok(())
}

pub fn write<W: Write>(w: &mut W, out: &Output, format: Format) -> Result<()> {
    match out {
        Output::Table(batch) => write_batch(w, batch, format),
        Output::Json(value) => {
            serde_json::to_writer_pretty(&mut *w, value)?;
            writeln!(w)?;
            Ok(())
        }
    }
}
