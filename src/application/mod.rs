// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal (training a model or answering a serving request).
//
// Rules for this layer:
//   - No model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training job: configuration and orchestration
pub mod train_use_case;

// Serving requests against the latest export
pub mod predict_use_case;
