//! RenderPass / Framebuffer compatibility.
//!
//! Two attachment signatures are compatible when they have the same number
//! of color attachments and every attachment agrees on format and sample
//! count. Load/store behaviour and final layouts do not participate.

use thiserror::Error;

use crate::descriptor::RenderPassLayout;
use crate::format::TextureFormat;
use crate::types::SampleCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompatibilityError {
    #[error("expected {expected} color attachments, got {actual}")]
    ColorCount { expected: usize, actual: usize },

    #[error(
        "color attachment {index} has format {actual:?}, expected {expected:?}"
    )]
    ColorFormat {
        index: usize,
        expected: TextureFormat,
        actual: TextureFormat,
    },

    #[error(
        "color attachment {index} has {actual:?} samples, expected \
         {expected:?}"
    )]
    ColorSampleCount {
        index: usize,
        expected: SampleCount,
        actual: SampleCount,
    },

    #[error("color attachment {index} resolve target presence differs")]
    ResolvePresence { index: usize },

    #[error(
        "resolve target {index} has format {actual:?}, expected {expected:?}"
    )]
    ResolveFormat {
        index: usize,
        expected: TextureFormat,
        actual: TextureFormat,
    },

    #[error("depth/stencil attachment presence differs")]
    DepthPresence,

    #[error("depth/stencil attachment has format {actual:?}, expected {expected:?}")]
    DepthFormat {
        expected: TextureFormat,
        actual: TextureFormat,
    },

    #[error(
        "depth/stencil attachment has {actual:?} samples, expected {expected:?}"
    )]
    DepthSampleCount {
        expected: SampleCount,
        actual: SampleCount,
    },
}

/// Format and sample count of one bound view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSignature {
    pub format: TextureFormat,
    pub sample_count: SampleCount,
}

/// Signature of the views bound by a framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramebufferSignature {
    pub color: Vec<AttachmentSignature>,
    pub resolve: Vec<Option<AttachmentSignature>>,
    pub depth_stencil: Option<AttachmentSignature>,
}

/// Check the views a framebuffer binds against a render pass.
pub fn check_framebuffer(
    pass: &RenderPassLayout,
    framebuffer: &FramebufferSignature,
) -> Result<(), CompatibilityError> {
    let expected = pass.color_attachments.len();
    if framebuffer.color.len() != expected {
        return Err(CompatibilityError::ColorCount {
            expected,
            actual: framebuffer.color.len(),
        });
    }

    for (index, (attachment, bound)) in
        pass.color_attachments.iter().zip(&framebuffer.color).enumerate()
    {
        if attachment.target.format != bound.format {
            return Err(CompatibilityError::ColorFormat {
                index,
                expected: attachment.target.format,
                actual: bound.format,
            });
        }
        if attachment.target.sample_count != bound.sample_count {
            return Err(CompatibilityError::ColorSampleCount {
                index,
                expected: attachment.target.sample_count,
                actual: bound.sample_count,
            });
        }

        let bound_resolve = framebuffer.resolve.get(index).copied().flatten();
        match (attachment.resolve_target, bound_resolve) {
            (None, None) => {}
            (Some(expected), Some(actual)) => {
                if expected.format != actual.format {
                    return Err(CompatibilityError::ResolveFormat {
                        index,
                        expected: expected.format,
                        actual: actual.format,
                    });
                }
            }
            _ => return Err(CompatibilityError::ResolvePresence { index }),
        }
    }

    match (pass.depth_stencil_attachment, framebuffer.depth_stencil) {
        (None, None) => Ok(()),
        (Some(expected), Some(actual)) => {
            if expected.format != actual.format {
                Err(CompatibilityError::DepthFormat {
                    expected: expected.format,
                    actual: actual.format,
                })
            } else if expected.sample_count != actual.sample_count {
                Err(CompatibilityError::DepthSampleCount {
                    expected: expected.sample_count,
                    actual: actual.sample_count,
                })
            } else {
                Ok(())
            }
        }
        _ => Err(CompatibilityError::DepthPresence),
    }
}

/// Check that two render passes share an attachment signature, so a
/// framebuffer or pipeline built for one can be used with the other.
pub fn check_render_passes(
    expected: &RenderPassLayout,
    actual: &RenderPassLayout,
) -> Result<(), CompatibilityError> {
    let signature = FramebufferSignature {
        color: actual
            .color_attachments
            .iter()
            .map(|a| AttachmentSignature {
                format: a.target.format,
                sample_count: a.target.sample_count,
            })
            .collect(),
        resolve: actual
            .color_attachments
            .iter()
            .map(|a| {
                a.resolve_target.map(|r| AttachmentSignature {
                    format: r.format,
                    sample_count: r.sample_count,
                })
            })
            .collect(),
        depth_stencil: actual.depth_stencil_attachment.map(|d| {
            AttachmentSignature {
                format: d.format,
                sample_count: d.sample_count,
            }
        }),
    };
    check_framebuffer(expected, &signature)
}

/// Check a render pipeline's target formats and sample count against the
/// pass it is built for. Resolve targets are not part of a pipeline.
pub fn check_pipeline_targets(
    pass: &RenderPassLayout,
    colors: &[TextureFormat],
    depth_stencil: Option<TextureFormat>,
    sample_count: SampleCount,
) -> Result<(), CompatibilityError> {
    let sig = |format| AttachmentSignature {
        format,
        sample_count,
    };
    let signature = FramebufferSignature {
        color: colors.iter().copied().map(sig).collect(),
        resolve: pass
            .color_attachments
            .iter()
            .map(|a| {
                a.resolve_target.map(|r| AttachmentSignature {
                    format: r.format,
                    sample_count: r.sample_count,
                })
            })
            .collect(),
        depth_stencil: depth_stencil.map(sig),
    };
    check_framebuffer(pass, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        LoadStoreOps, RenderPassColorAttachment, RenderPassColorTarget,
        RenderPassDepthStencilTarget,
    };
    use crate::types::TextureLayout;

    fn color(format: TextureFormat) -> RenderPassColorAttachment {
        RenderPassColorAttachment {
            target: RenderPassColorTarget {
                format,
                sample_count: SampleCount::X1,
                ops: LoadStoreOps::CLEAR_STORE,
                final_layout: TextureLayout::ShaderReadOnly,
            },
            resolve_target: None,
        }
    }

    fn two_color_depth() -> RenderPassLayout {
        RenderPassLayout {
            color_attachments: vec![
                color(TextureFormat::R8G8B8A8Unorm),
                color(TextureFormat::R16G16B16A16Float),
            ],
            depth_stencil_attachment: Some(RenderPassDepthStencilTarget {
                format: TextureFormat::Depth32Float,
                sample_count: SampleCount::X1,
                depth_ops: LoadStoreOps::CLEAR_STORE,
                stencil_ops: LoadStoreOps::DONT_CARE,
                final_layout: TextureLayout::DepthStencilAttachment,
            }),
        }
    }

    fn sig(format: TextureFormat) -> AttachmentSignature {
        AttachmentSignature {
            format,
            sample_count: SampleCount::X1,
        }
    }

    fn matching() -> FramebufferSignature {
        FramebufferSignature {
            color: vec![
                sig(TextureFormat::R8G8B8A8Unorm),
                sig(TextureFormat::R16G16B16A16Float),
            ],
            resolve: vec![None, None],
            depth_stencil: Some(sig(TextureFormat::Depth32Float)),
        }
    }

    #[test]
    fn matching_signature_is_compatible() {
        assert_eq!(check_framebuffer(&two_color_depth(), &matching()), Ok(()));
    }

    #[test]
    fn count_mismatch_is_reported() {
        let mut fb = matching();
        fb.color.pop();
        assert_eq!(
            check_framebuffer(&two_color_depth(), &fb),
            Err(CompatibilityError::ColorCount {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn format_and_sample_mismatches_are_reported() {
        let mut fb = matching();
        fb.color[1].format = TextureFormat::R8G8B8A8Unorm;
        assert!(matches!(
            check_framebuffer(&two_color_depth(), &fb),
            Err(CompatibilityError::ColorFormat { index: 1, .. })
        ));

        let mut fb = matching();
        fb.color[0].sample_count = SampleCount::X4;
        assert!(matches!(
            check_framebuffer(&two_color_depth(), &fb),
            Err(CompatibilityError::ColorSampleCount { index: 0, .. })
        ));

        let mut fb = matching();
        fb.depth_stencil = None;
        assert_eq!(
            check_framebuffer(&two_color_depth(), &fb),
            Err(CompatibilityError::DepthPresence)
        );
    }

    #[test]
    fn load_store_ops_do_not_affect_pass_compatibility() {
        let a = two_color_depth();
        let mut b = two_color_depth();
        b.color_attachments[0].target.ops = LoadStoreOps::LOAD_STORE;
        b.color_attachments[1].target.final_layout = TextureLayout::General;
        assert_eq!(check_render_passes(&a, &b), Ok(()));

        b.color_attachments[1].target.format = TextureFormat::R32Float;
        assert!(check_render_passes(&a, &b).is_err());
    }

    #[test]
    fn pipeline_targets_follow_the_pass() {
        let pass = two_color_depth();
        let colors = [
            TextureFormat::R8G8B8A8Unorm,
            TextureFormat::R16G16B16A16Float,
        ];
        let depth = Some(TextureFormat::Depth32Float);
        assert_eq!(
            check_pipeline_targets(&pass, &colors, depth, SampleCount::X1),
            Ok(())
        );
        assert!(matches!(
            check_pipeline_targets(&pass, &colors, depth, SampleCount::X4),
            Err(CompatibilityError::ColorSampleCount { index: 0, .. })
        ));
        assert_eq!(
            check_pipeline_targets(&pass, &colors, None, SampleCount::X1),
            Err(CompatibilityError::DepthPresence)
        );
    }
}
