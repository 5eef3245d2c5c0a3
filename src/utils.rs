use std::path::Path;

use tch::Tensor;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

pub trait ToTensor {
    /// Float tensor of shape `[1, dim]`.
    fn to_tensor(&self) -> Tensor;
}

impl<const N: usize> ToTensor for [f32; N] {
    fn to_tensor(&self) -> Tensor {
        Tensor::from_slice(self).unsqueeze(0)
    }
}

impl ToTensor for Vec<f32> {
    fn to_tensor(&self) -> Tensor {
        Tensor::from_slice(self).unsqueeze(0)
    }
}

pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deeprl=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deeprl=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .init();
}

/// Trailing mean over at most `window` values ending at each position.
pub fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1);
    let mut sum = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            sum += v;
            if i >= window {
                sum -= values[i - window];
            }
            sum / (i + 1).min(window) as f32
        })
        .collect()
}

fn plot_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Plot {
        message: format!("{e:?}"),
    }
}

/// Draws episode rewards plus a 20-episode moving average into a PNG.
pub fn plot_rewards(rewards: &[f32], filename: &Path, title: &str) -> Result<()> {
    use plotters::prelude::*;

    if rewards.is_empty() {
        return Err(Error::Plot {
            message: "no rewards to plot".to_string(),
        });
    }

    let root = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let min_reward = rewards.iter().cloned().fold(f32::MAX, f32::min);
    let max_reward = rewards.iter().cloned().fold(f32::MIN, f32::max);
    // 避免空图或全为同一值
    let pad = ((max_reward - min_reward) * 0.05).max(1.0);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32).into_font())
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..rewards.len(), (min_reward - pad)..(max_reward + pad))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Episode")
        .y_desc("Total Reward")
        .axis_desc_style(("sans-serif", 22))
        .label_style(("sans-serif", 18))
        .light_line_style(WHITE.mix(0.3))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            rewards.iter().enumerate().map(|(i, r)| (i, *r)),
            &BLUE.mix(0.4),
        ))
        .map_err(plot_err)?
        .label("Reward")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 20, y)], BLUE.mix(0.4)));

    chart
        .draw_series(LineSeries::new(
            moving_average(rewards, 20).into_iter().enumerate(),
            &RED,
        ))
        .map_err(plot_err)?
        .label("Moving average (20)")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::info!(path = %filename.display(), "saved training plot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_become_row_tensors() {
        let t = [1.0f32, 2.0, 3.0].to_tensor();
        assert_eq!(t.size(), vec![1, 3]);
        let t = vec![0.5f32; 5].to_tensor();
        assert_eq!(t.size(), vec![1, 5]);
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let avg = moving_average(&[2.0, 4.0, 6.0, 8.0], 2);
        assert_eq!(avg, vec![2.0, 3.0, 5.0, 7.0]);
        assert_eq!(moving_average(&[1.0, 3.0], 0), vec![1.0, 3.0]);
    }

    #[test]
    fn empty_rewards_are_not_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(plot_rewards(&[], &path, "empty").is_err());
        assert!(!path.exists());
    }
}
