use crate::types::{Image, Mask};

use ndarray::Array2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pixel `(row, column)`
type Pixel = (usize, usize);

/// Source found in a residual image, cutout-local coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResidualSource {
    /// Flux-weighted centroid
    pub x: f64,
    pub y: f64,
    pub flux: f64,
    pub peak: f64,
    /// Pixels
    pub area: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResidualDetection {
    pub band: String,
    pub sources: Vec<ResidualSource>,
    /// Index of the owning source plus one, zero for undetected pixels
    pub segmap: Array2<u32>,
}

/// Thresholding and deblending parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Detection threshold on the significance image
    pub thresh: f64,
    pub minarea: usize,
    /// Number of deblending levels between the threshold and the peak
    pub deblend_nthresh: usize,
    /// Minimum flux fraction of the parent a branch needs to be split off
    pub deblend_cont: f64,
}

impl DetectionParams {
    pub fn new(thresh: f64, minarea: usize, deblend_nthresh: usize, deblend_cont: f64) -> Self {
        assert!(thresh > 0.0, "thresh must be positive");
        assert!(deblend_nthresh > 0, "deblend_nthresh must be positive");
        assert!(
            (0.0..=1.0).contains(&deblend_cont),
            "deblend_cont must be in [0, 1]"
        );
        Self {
            thresh,
            minarea,
            deblend_nthresh,
            deblend_cont,
        }
    }
}

fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        parent[x as usize] = parent[parent[x as usize] as usize];
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb) as usize] = ra.min(rb);
    }
}

/// Label 8-connected groups of `true` pixels
///
/// Labels start from one in raster order of the first pixel of each group, zero is left for
/// the background. Returns the label image and the number of groups.
pub fn label_components(pass: &Mask) -> (Array2<u32>, usize) {
    let (nrows, ncols) = pass.dim();
    let mut labels = Array2::<u32>::zeros((nrows, ncols));
    let mut parent: Vec<u32> = vec![0];

    for row in 0..nrows {
        for col in 0..ncols {
            if !pass[[row, col]] {
                continue;
            }
            let mut label = 0;
            let neighbours = [
                (Some(row), col.checked_sub(1)),
                (row.checked_sub(1), col.checked_sub(1)),
                (row.checked_sub(1), Some(col)),
                (row.checked_sub(1), Some(col + 1).filter(|&c| c < ncols)),
            ];
            for (r, c) in neighbours {
                let (Some(r), Some(c)) = (r, c) else {
                    continue;
                };
                let other = labels[[r, c]];
                if other == 0 {
                    continue;
                }
                if label == 0 {
                    label = find(&mut parent, other);
                } else {
                    union(&mut parent, label, other);
                    label = find(&mut parent, label);
                }
            }
            if label == 0 {
                label = parent.len() as u32;
                parent.push(label);
            }
            labels[[row, col]] = label;
        }
    }

    let mut compact = vec![0u32; parent.len()];
    let mut n = 0;
    for label in labels.iter_mut().filter(|label| **label != 0) {
        let root = find(&mut parent, *label) as usize;
        if compact[root] == 0 {
            n += 1;
            compact[root] = n;
        }
        *label = compact[root];
    }
    (labels, n as usize)
}

/// Connected groups of the `pixels` with significance above `level`
fn components_above(pixels: &[Pixel], significance: &Image, level: f64) -> Vec<Vec<Pixel>> {
    let mut pass = Mask::from_elem(significance.dim(), false);
    for &(row, col) in pixels {
        pass[[row, col]] = significance[[row, col]] > level;
    }
    let (labels, n) = label_components(&pass);
    let mut groups = vec![vec![]; n];
    for &(row, col) in pixels {
        let label = labels[[row, col]];
        if label != 0 {
            groups[label as usize - 1].push((row, col));
        }
    }
    groups
}

fn total_flux(pixels: &[Pixel], flux: &Image) -> f64 {
    pixels.iter().map(|&p| flux[p]).sum()
}

fn peak_pixel(pixels: &[Pixel], significance: &Image) -> Pixel {
    pixels
        .iter()
        .copied()
        .max_by(|&a, &b| significance[a].total_cmp(&significance[b]))
        .unwrap_or((0, 0))
}

/// Split `pixels` at the first of `levels` where two or more significant branches appear
///
/// Branches are deblended further from the next level on, pixels left outside every branch go
/// to the branch with the nearest peak.
fn deblend(
    pixels: &[Pixel],
    significance: &Image,
    flux: &Image,
    levels: &[f64],
    min_flux: f64,
    minarea: usize,
) -> Vec<Vec<Pixel>> {
    for (k, &level) in levels.iter().enumerate() {
        let branches: Vec<_> = components_above(pixels, significance, level)
            .into_iter()
            .filter(|branch| branch.len() >= minarea && total_flux(branch, flux) >= min_flux)
            .collect();
        if branches.len() < 2 {
            continue;
        }

        let mut objects: Vec<Vec<Pixel>> = branches
            .iter()
            .flat_map(|branch| {
                deblend(branch, significance, flux, &levels[k + 1..], min_flux, minarea)
            })
            .collect();
        let peaks: Vec<Pixel> = objects
            .iter()
            .map(|object| peak_pixel(object, significance))
            .collect();
        let mut owned = Mask::from_elem(significance.dim(), false);
        for &p in objects.iter().flatten() {
            owned[p] = true;
        }
        for &(row, col) in pixels.iter().filter(|&&p| !owned[p]) {
            let distance = |&(r, c): &Pixel| {
                let dr = r as f64 - row as f64;
                let dc = c as f64 - col as f64;
                dr * dr + dc * dc
            };
            let nearest = (0..peaks.len())
                .min_by(|&a, &b| distance(&peaks[a]).total_cmp(&distance(&peaks[b])))
                .unwrap_or(0);
            objects[nearest].push((row, col));
        }
        return objects;
    }
    vec![pixels.to_vec()]
}

fn measure(pixels: &[Pixel], flux: &Image) -> ResidualSource {
    let total = total_flux(pixels, flux);
    let positive: f64 = pixels.iter().map(|&p| flux[p].max(0.0)).sum();
    let (x, y) = if positive > 0.0 {
        pixels.iter().fold((0.0, 0.0), |(x, y), &(row, col)| {
            let w = flux[[row, col]].max(0.0) / positive;
            (x + w * col as f64, y + w * row as f64)
        })
    } else {
        let n = pixels.len() as f64;
        pixels.iter().fold((0.0, 0.0), |(x, y), &(row, col)| {
            (x + col as f64 / n, y + row as f64 / n)
        })
    };
    let peak = pixels
        .iter()
        .map(|&p| flux[p])
        .fold(f64::NEG_INFINITY, f64::max);
    ResidualSource {
        x,
        y,
        flux: total,
        peak,
        area: pixels.len(),
    }
}

/// Detect sources on `flux` where `significance` exceeds the threshold
///
/// Components smaller than `minarea` are dropped, the rest are deblended with levels spaced
/// exponentially between the threshold and the component peak.
pub fn extract_sources(
    flux: &Image,
    significance: &Image,
    params: &DetectionParams,
) -> (Vec<ResidualSource>, Array2<u32>) {
    assert_eq!(
        flux.dim(),
        significance.dim(),
        "flux and significance should have the same shape"
    );
    let pass = significance.mapv(|s| s > params.thresh);
    let (labels, n) = label_components(&pass);
    let mut components = vec![vec![]; n];
    for ((row, col), &label) in labels.indexed_iter() {
        if label != 0 {
            components[label as usize - 1].push((row, col));
        }
    }

    let mut sources = vec![];
    let mut segmap = Array2::<u32>::zeros(flux.dim());
    for component in components.iter().filter(|c| c.len() >= params.minarea) {
        let peak = significance[peak_pixel(component, significance)];
        let levels: Vec<f64> = (1..params.deblend_nthresh)
            .map(|k| {
                params.thresh
                    * (peak / params.thresh).powf(k as f64 / params.deblend_nthresh as f64)
            })
            .collect();
        let min_flux = params.deblend_cont * total_flux(component, flux);
        for object in deblend(
            component,
            significance,
            flux,
            &levels,
            min_flux,
            params.minarea,
        ) {
            sources.push(measure(&object, flux));
            let label = sources.len() as u32;
            for &p in object.iter() {
                segmap[p] = label;
            }
        }
    }
    (sources, segmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn gaussians(dim: (usize, usize), centers: &[(f64, f64)], amp: f64, sigma: f64) -> Image {
        Image::from_shape_fn(dim, |(row, col)| {
            centers
                .iter()
                .map(|&(x, y)| {
                    let r2 = (col as f64 - x).powi(2) + (row as f64 - y).powi(2);
                    amp * f64::exp(-0.5 * r2 / (sigma * sigma))
                })
                .sum()
        })
    }

    #[test]
    fn labels_follow_eight_connectivity() {
        let mut pass = Mask::from_elem((6, 6), false);
        pass[[0, 0]] = true;
        pass[[1, 1]] = true;
        pass[[2, 2]] = true;
        pass[[0, 5]] = true;
        pass[[5, 0]] = true;
        pass[[5, 1]] = true;
        let (labels, n) = label_components(&pass);
        assert_eq!(n, 3);
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[2, 2]], 1);
        assert_eq!(labels[[0, 5]], 2);
        assert_eq!(labels[[5, 1]], 3);
        assert_eq!(labels[[3, 3]], 0);
    }

    #[test]
    fn u_shape_is_merged() {
        let mut pass = Mask::from_elem((4, 5), false);
        for row in 0..4 {
            pass[[row, 0]] = true;
            pass[[row, 4]] = true;
        }
        for col in 0..5 {
            pass[[3, col]] = true;
        }
        let (labels, n) = label_components(&pass);
        assert_eq!(n, 1);
        assert!(labels.iter().all(|&l| l <= 1));
    }

    #[test]
    fn small_components_are_dropped() {
        let mut image = Image::zeros((10, 10));
        image[[2, 2]] = 10.0;
        image[[7, 7]] = 10.0;
        image[[7, 8]] = 10.0;
        image[[8, 7]] = 10.0;
        let params = DetectionParams::new(1.0, 3, 1, 0.005);
        let (sources, segmap) = extract_sources(&image, &image, &params);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].area, 3);
        assert_abs_diff_eq!(sources[0].flux, 30.0);
        assert_eq!(segmap[[2, 2]], 0);
        assert_eq!(segmap[[8, 7]], 1);
    }

    #[test]
    fn blended_peaks_are_deblended() {
        let image = gaussians((20, 40), &[(12.0, 10.0), (24.0, 10.0)], 100.0, 2.0);
        let single = DetectionParams::new(1.0, 5, 1, 0.005);
        assert_eq!(extract_sources(&image, &image, &single).0.len(), 1);

        let params = DetectionParams::new(1.0, 5, 32, 0.005);
        let (sources, segmap) = extract_sources(&image, &image, &params);
        assert_eq!(sources.len(), 2);
        let mut xs: Vec<f64> = sources.iter().map(|s| s.x).collect();
        xs.sort_by(f64::total_cmp);
        assert_abs_diff_eq!(xs[0], 12.0, epsilon = 0.5);
        assert_abs_diff_eq!(xs[1], 24.0, epsilon = 0.5);
        for source in sources.iter() {
            assert_abs_diff_eq!(source.y, 10.0, epsilon = 1e-6);
            assert_abs_diff_eq!(source.peak, 100.0, epsilon = 1e-4);
        }
        assert_ne!(segmap[[10, 12]], segmap[[10, 24]]);
    }

    #[test]
    fn faint_branch_needs_contrast() {
        let image = gaussians((20, 40), &[(12.0, 10.0)], 100.0, 2.0)
            + gaussians((20, 40), &[(24.0, 10.0)], 20.0, 2.0);
        let strict = DetectionParams::new(1.0, 5, 32, 0.5);
        assert_eq!(extract_sources(&image, &image, &strict).0.len(), 1);
        let loose = DetectionParams::new(1.0, 5, 32, 0.005);
        assert_eq!(extract_sources(&image, &image, &loose).0.len(), 2);
    }
}
