use crate::error::CatalogError;
use crate::photometry::ApertureFlux;
use crate::pipeline::BlobReport;
use crate::projection::FitRecord;
use crate::types::{BlobId, SourceId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Row of the parent catalog: detection seeds in brick pixels plus the fit results
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub sid: SourceId,
    pub x: f64,
    pub y: f64,
    /// Flux guess
    pub flux: f64,
    /// Semi-major axis, pixels
    pub a: f64,
    /// Semi-minor axis, pixels
    pub b: f64,
    /// Position angle, radians
    pub theta: f64,
    pub fit: Option<FitRecord>,
    /// Aperture photometry keyed by `{band}_{image_type}`
    pub aperture: BTreeMap<String, Vec<ApertureFlux>>,
    /// Number of sources detected in the residual of the blob, per band
    pub residual_sources: BTreeMap<String, usize>,
}

impl SourceRow {
    pub fn new(sid: SourceId, x: f64, y: f64, flux: f64, a: f64, b: f64, theta: f64) -> Self {
        Self {
            sid,
            x,
            y,
            flux,
            a,
            b,
            theta,
            fit: None,
            aperture: BTreeMap::new(),
            residual_sources: BTreeMap::new(),
        }
    }
}

/// Parent catalog, rows are looked up by source id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    rows: Vec<SourceRow>,
    index: HashMap<SourceId, usize>,
}

impl Catalog {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        let index: HashMap<_, _> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.sid, i))
            .collect();
        assert_eq!(index.len(), rows.len(), "source ids should be unique");
        Self { rows, index }
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, sid: SourceId) -> bool {
        self.index.contains_key(&sid)
    }

    pub fn get(&self, sid: SourceId) -> Option<&SourceRow> {
        self.index.get(&sid).map(|&i| &self.rows[i])
    }

    pub fn row_index(&self, blob_id: BlobId, sid: SourceId) -> Result<usize, CatalogError> {
        self.index
            .get(&sid)
            .copied()
            .ok_or(CatalogError::MissingSource { blob_id, sid })
    }

    /// Write the results of a blob
    ///
    /// Every source id of the report is looked up before the first write, so a missing row
    /// leaves the catalog untouched.
    pub fn apply_report(&mut self, report: &BlobReport) -> Result<(), CatalogError> {
        let blob_id = report.blob_id;
        let rows = report
            .records
            .iter()
            .map(|record| Ok((record.sid, self.row_index(blob_id, record.sid)?)))
            .collect::<Result<HashMap<_, _>, CatalogError>>()?;
        let row_of = |sid| {
            rows.get(&sid)
                .copied()
                .ok_or(CatalogError::MissingSource { blob_id, sid })
        };
        for phot in report.aperture.iter() {
            for &(sid, _) in phot.sources.iter() {
                row_of(sid)?;
            }
        }

        for record in report.records.iter() {
            self.rows[rows[&record.sid]].fit = Some(record.clone());
        }
        for phot in report.aperture.iter() {
            let key = phot.key();
            for (sid, fluxes) in phot.sources.iter() {
                self.rows[rows[sid]].aperture.insert(key.clone(), fluxes.clone());
            }
        }
        for detection in report.residuals.iter() {
            for &row in rows.values() {
                self.rows[row]
                    .residual_sources
                    .insert(detection.band.clone(), detection.sources.len());
            }
        }
        Ok(())
    }
}

impl FromIterator<SourceRow> for Catalog {
    fn from_iter<I: IntoIterator<Item = SourceRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        [3, 1, 7]
            .into_iter()
            .map(|sid| SourceRow::new(sid, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0))
            .collect()
    }

    #[test]
    fn lookup_by_id() {
        let catalog = catalog();
        assert_eq!(catalog.row_index(0, 7), Ok(2));
        assert_eq!(catalog.get(1).map(|row| row.sid), Some(1));
        assert_eq!(
            catalog.row_index(5, 4),
            Err(CatalogError::MissingSource { blob_id: 5, sid: 4 })
        );
    }

    #[test]
    #[should_panic]
    fn duplicate_ids() {
        Catalog::new(vec![
            SourceRow::new(1, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0),
            SourceRow::new(1, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0),
        ]);
    }
}
