use std::cmp::Ordering;

use super::{FeatureSeed, GridConfig};

/// Strongest first; equal scores fall back to raster order so the result does
/// not depend on where the image origin sits relative to the grid cells.
pub fn strongest_first(a: &FeatureSeed, b: &FeatureSeed) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.position.y.total_cmp(&b.position.y))
        .then_with(|| a.position.x.total_cmp(&b.position.x))
}

pub fn radius_nms(seeds: Vec<FeatureSeed>, radius: f32, max_keep: usize) -> Vec<FeatureSeed> {
    let r2 = radius * radius;
    let mut kept: Vec<FeatureSeed> = Vec::with_capacity(seeds.len().min(max_keep));
    for s in seeds {
        if kept.len() == max_keep {
            break;
        }
        let suppressed = kept.iter().any(|k| (s.position - k.position).norm_squared() <= r2);
        if !suppressed {
            kept.push(s);
        }
    }
    kept
}

/// Caps seeds per grid cell, then applies radius NMS and the global cap.
/// `x_lo`/`y_lo` is the top-left of the detection window.
pub fn distribute(
    seeds: Vec<FeatureSeed>,
    grid: &GridConfig,
    x_lo: usize,
    y_lo: usize,
    cells_x: usize,
    cells_y: usize,
) -> Vec<FeatureSeed> {
    let cell = grid.cell_size.max(4);
    let per_cell_cap = grid.per_cell_cap.max(1);

    let mut buckets: Vec<Vec<FeatureSeed>> = vec![Vec::new(); cells_x * cells_y];
    for seed in seeds {
        let cx = (seed.position.x as usize).saturating_sub(x_lo) / cell;
        let cy = (seed.position.y as usize).saturating_sub(y_lo) / cell;
        if cx >= cells_x || cy >= cells_y {
            continue;
        }
        buckets[cy * cells_x + cx].push(seed);
    }

    let mut kept: Vec<FeatureSeed> = buckets
        .into_iter()
        .flat_map(|mut bucket| {
            bucket.sort_by(strongest_first);
            bucket.truncate(per_cell_cap);
            bucket
        })
        .collect();
    kept.sort_by(strongest_first);

    if grid.nms_radius_px > 0.0 {
        radius_nms(kept, grid.nms_radius_px, grid.max_features)
    } else {
        kept.truncate(grid.max_features);
        kept
    }
}
