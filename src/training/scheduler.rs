//! Learning Rate Scheduler Module
//!
//! Epoch-level learning rate schedules. The trainer evaluates the schedule
//! before each epoch, which matches stepping the scheduler once after every
//! epoch.

use serde::{Deserialize, Serialize};

/// Learning rate scheduler that adjusts the learning rate during training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LRScheduler {
    /// Cosine annealing: smooth decay following cosine curve
    CosineAnnealing {
        initial_lr: f64,
        min_lr: f64,
        total_epochs: usize,
    },
}

impl LRScheduler {
    /// Create a cosine annealing scheduler with `T_max = total_epochs`
    pub fn cosine_annealing(initial_lr: f64, min_lr: f64, total_epochs: usize) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            min_lr,
            total_epochs,
        }
    }

    /// Get the learning rate for a given (zero-based) epoch
    pub fn get_lr(&self, epoch: usize) -> f64 {
        match self {
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => {
                if *total_epochs == 0 {
                    return *initial_lr;
                }
                let progress = (epoch.min(*total_epochs) as f64) / (*total_epochs as f64);
                let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (initial_lr - min_lr) * cosine_factor
            }
        }
    }

    /// Get a description of the scheduler
    pub fn description(&self) -> String {
        match self {
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => format!(
                "Cosine Annealing: initial={:.6}, min={:.6}, epochs={}",
                initial_lr, min_lr, total_epochs
            ),
        }
    }
}
