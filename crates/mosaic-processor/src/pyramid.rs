//! Overview (pyramid) levels for a finished mosaic.
//!
//! Each level is cascaded from the previous one, block by block: an
//! overview block of `b x b` cells reads at most a `(b*r) x (b*r)` window
//! of the previous level, `r` being the ratio between the two factors.
//! Overview dimensions are `ceil(full / factor)`, so the last row and
//! column of cells may aggregate fewer source pixels.

use serde_json::json;
use tracing::{debug, info};

use mosaic_common::Window;

use crate::config::{OverviewMethod, OverviewOptions};
use crate::error::{MosaicError, Result};
use crate::store::MosaicStore;
use crate::validity::ValidityPredicate;

/// Levels built by [`build_overviews`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewSummary {
    pub factors: Vec<usize>,
    pub method: OverviewMethod,
    pub blocks_written: usize,
}

/// Build every configured overview level into `store`.
///
/// On success the factors, level paths and method are recorded in the
/// store's `overviews` attribute. On failure the error is returned and
/// the caller decides what to do with the partial levels. Cells aggregate
/// only the pixels `validity` accepts.
pub fn build_overviews(
    store: &mut MosaicStore,
    options: &OverviewOptions,
    validity: &dyn ValidityPredicate,
) -> Result<OverviewSummary> {
    options.validate()?;

    let nodata = store.nodata();
    let block_size = store.block_size();
    let mut blocks_written = 0;
    let mut prev_index = 0;
    let mut prev_factor = 1;
    let mut paths = Vec::with_capacity(options.factors.len());

    for &factor in &options.factors {
        let ratio = factor / prev_factor;
        let index = store.add_level(factor)?;
        let (level_grid, _) = store
            .level(index)
            .ok_or_else(|| MosaicError::Overview(format!("level {} missing after creation", index)))?;
        let (prev_w, prev_h) = {
            let (prev, _) = store
                .level(prev_index)
                .ok_or_else(|| MosaicError::Overview(format!("level {} missing", prev_index)))?;
            (prev.width, prev.height)
        };
        let tiling = level_grid.tiling(block_size);

        for window in tiling {
            let src_col = window.col * ratio;
            let src_row = window.row * ratio;
            let src = Window::new(
                src_col,
                src_row,
                (window.width * ratio).min(prev_w - src_col),
                (window.height * ratio).min(prev_h - src_row),
            );
            let data = store.read_window(prev_index, &src)?;
            let valid = validity.mask(&data, nodata);
            let out = downsample(
                &data,
                &valid,
                src.width,
                src.height,
                ratio,
                window.width,
                window.height,
                nodata,
                options.method,
            );
            store.write_window(index, &window, &out)?;
            blocks_written += 1;
        }

        debug!(level = index, factor = factor, ratio = ratio, "Built overview level");
        paths.push(index.to_string());
        prev_index = index;
        prev_factor = factor;
    }

    store.set_attribute(
        "overviews",
        json!({
            "factors": options.factors,
            "paths": paths,
            "resampling": options.method.as_str(),
        }),
    )?;

    info!(
        factors = ?options.factors,
        method = %options.method,
        blocks = blocks_written,
        "Built overviews"
    );

    Ok(OverviewSummary {
        factors: options.factors.clone(),
        method: options.method,
        blocks_written,
    })
}

/// Aggregate `ratio x ratio` cells of `data` (row-major, `width x height`)
/// into an `out_width x out_height` grid, skipping pixels whose `valid`
/// entry is false. Cells hanging over the source edge aggregate only the
/// pixels that exist.
#[allow(clippy::too_many_arguments)]
pub fn downsample(
    data: &[f32],
    valid: &[bool],
    width: usize,
    height: usize,
    ratio: usize,
    out_width: usize,
    out_height: usize,
    nodata: f32,
    method: OverviewMethod,
) -> Vec<f32> {
    let mut out = vec![nodata; out_width * out_height];

    for oy in 0..out_height {
        let y0 = oy * ratio;
        let y1 = ((oy + 1) * ratio).min(height);
        for ox in 0..out_width {
            let x0 = ox * ratio;
            let x1 = ((ox + 1) * ratio).min(width);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            out[oy * out_width + ox] = match method {
                OverviewMethod::Nearest => {
                    let i = y0 * width + x0;
                    if valid[i] {
                        data[i]
                    } else {
                        nodata
                    }
                }
                OverviewMethod::Average => {
                    let mut sum = 0.0f64;
                    let mut count = 0usize;
                    for y in y0..y1 {
                        for i in y * width + x0..y * width + x1 {
                            if valid[i] {
                                sum += data[i] as f64;
                                count += 1;
                            }
                        }
                    }
                    if count == 0 {
                        nodata
                    } else {
                        (sum / count as f64) as f32
                    }
                }
                OverviewMethod::Max => {
                    let mut max: Option<f32> = None;
                    for y in y0..y1 {
                        for i in y * width + x0..y * width + x1 {
                            if valid[i] {
                                let v = data[i];
                                max = Some(max.map_or(v, |m| m.max(v)));
                            }
                        }
                    }
                    max.unwrap_or(nodata)
                }
            };
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeOptions;
    use crate::validity::{FiniteNotNodata, ValueRange};
    use mosaic_common::{Crs, GridSpec};
    use test_utils::{assert_approx_eq, lattice_transform};

    const ND: f32 = -9999.0;

    fn downsample_default(
        data: &[f32],
        width: usize,
        height: usize,
        ratio: usize,
        out: (usize, usize),
        method: OverviewMethod,
    ) -> Vec<f32> {
        let valid = FiniteNotNodata.mask(data, ND);
        downsample(data, &valid, width, height, ratio, out.0, out.1, ND, method)
    }

    #[test]
    fn test_average_ignores_invalid() {
        #[rustfmt::skip]
        let data = vec![
            1.0, 3.0, ND,  ND,
            ND,  2.0, ND,  f32::NAN,
        ];
        let out = downsample_default(&data, 4, 2, 2, (2, 1), OverviewMethod::Average);
        assert_approx_eq!(out[0], 2.0, 1e-6);
        assert_eq!(out[1], ND);
    }

    #[test]
    fn test_partial_edge_cell() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // 3x2 source, ratio 2: second cell covers a single column
        let out = downsample_default(&data, 3, 2, 2, (2, 1), OverviewMethod::Average);
        assert_eq!(out, vec![3.0, 4.5]);
    }

    #[test]
    fn test_nearest_and_max() {
        let data = vec![1.0, 7.0, ND, 4.0];
        assert_eq!(downsample_default(&data, 2, 2, 2, (1, 1), OverviewMethod::Nearest), vec![1.0]);
        assert_eq!(downsample_default(&data, 2, 2, 2, (1, 1), OverviewMethod::Max), vec![7.0]);
    }

    #[test]
    fn test_predicate_excludes_out_of_range() {
        // 250 is a fill code, valid under the default rule but not the range
        let data = vec![2.0, 250.0, 4.0, ND];
        let valid = ValueRange::new(0.0, 10.0).mask(&data, ND);
        assert_eq!(
            downsample(&data, &valid, 2, 2, 2, 1, 1, ND, OverviewMethod::Average),
            vec![3.0]
        );
        assert_eq!(
            downsample(&data, &valid, 2, 2, 2, 1, 1, ND, OverviewMethod::Max),
            vec![4.0]
        );

        let valid = ValueRange::new(0.0, 1.0).mask(&data, ND);
        assert_eq!(
            downsample(&data, &valid, 2, 2, 2, 1, 1, ND, OverviewMethod::Nearest),
            vec![ND]
        );
    }

    #[test]
    fn test_build_overviews_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(Crs::CONUS_ALBERS, lattice_transform(0, 0), 10, 6);
        let opts = MergeOptions {
            block_size: 4,
            ..Default::default()
        };
        let mut store = MosaicStore::create(&dir.path().join("m.zarr"), &grid, ND, &opts).unwrap();
        store.write_block(&grid.full_window(), &vec![2.0; 60]).unwrap();

        let overviews = OverviewOptions {
            enabled: true,
            factors: vec![2, 4, 8],
            method: OverviewMethod::Average,
        };
        let summary = build_overviews(&mut store, &overviews, &FiniteNotNodata).unwrap();
        assert_eq!(summary.factors, vec![2, 4, 8]);
        assert_eq!(store.level_count(), 4);

        let (l1, _) = store.level(1).unwrap();
        assert_eq!((l1.width, l1.height), (5, 3));
        let (l3, f3) = store.level(3).unwrap();
        assert_eq!((l3.width, l3.height, f3), (2, 1, 8));

        let coarse = store.read_window(3, &Window::new(0, 0, 2, 1)).unwrap();
        assert_eq!(coarse, vec![2.0, 2.0]);

        let attrs = store.attributes();
        assert_eq!(attrs["overviews"]["resampling"], json!("average"));
        assert_eq!(attrs["overviews"]["paths"], json!(["1", "2", "3"]));
    }
}
