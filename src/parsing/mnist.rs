use super::{RawDataset, NUM_PIXELS};
use crate::error::{open, Error, Resource, Result};
use std::io::{BufReader, Read};
use std::path::Path;

const LINE_SIZE: usize = NUM_PIXELS + 1;

/// Parse a dataset in CSV form, one sample per record:
/// <label>,<pixel0x0>,<pixel0x1>,...
/// A leading header row (as in https://www.kaggle.com/datasets/oddrationale/mnist-in-csv)
/// is skipped when its first field is not a number.
pub fn read_csv<R: Read>(reader: R, resource: Resource) -> Result<RawDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut dataset = RawDataset::default();

    for (line, record) in reader.records().enumerate() {
        let record = record?;

        if line == 0 && record.get(0).map_or(false, |x| x.trim().parse::<u8>().is_err()) {
            continue;
        }
        if record.len() != LINE_SIZE {
            return Err(Error::malformed(
                resource,
                format!("line {} has {} fields, expected {}", line + 1, record.len(), LINE_SIZE),
            ));
        }

        let parse = |field: &str| {
            field.trim().parse::<u8>().map_err(|_| {
                Error::malformed(resource, format!("line {}: {:?} is not a byte", line + 1, field))
            })
        };

        dataset.labels.push(parse(&record[0])?);
        for field in record.iter().skip(1) {
            dataset.images.push(parse(field)?);
        }
    }

    Ok(dataset)
}

pub fn load(path: &Path, resource: Resource) -> Result<RawDataset> {
    let file = open(path, resource)?;

    read_csv(BufReader::new(file), resource)
}
