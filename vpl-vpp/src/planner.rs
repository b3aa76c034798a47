//! Filter pipeline planner
//!
//! Turns a channel's requested operations into an ordered, validated stage
//! list. Individual bad values are `InvalidParameter`; combinations this
//! pipeline cannot run (conflicting filters, forbidden filters, enhance
//! filters on unsupported formats) are `IncompatibleParameter`.

use crate::types::{
    FilterKind, OrderingPolicy, PipelinePlan, Stage, StageOp, StageSpec, VppHints, VppOperation,
    DEFAULT_FILTER_STRENGTH, MAX_FILTER_STRENGTH,
};
use std::collections::BTreeSet;
use vpl_video::{FrameInfo, Rect, Result, VideoFormat, VplError};

/// Requested operations, one slot per filter kind
#[derive(Debug, Default)]
struct Requested {
    crop: Option<Rect>,
    scale: Option<(u32, u32)>,
    color_convert: bool,
    composite: Option<Rect>,
    sharpen: Option<f64>,
    blur: Option<f64>,
    kinds: BTreeSet<FilterKind>,
}

fn check_frame(info: &FrameInfo, what: &str) -> Result<()> {
    if !info.format.is_supported() {
        return Err(VplError::invalid(format!(
            "{what} format {:?} is not supported",
            info.format
        )));
    }
    if info.width == 0 || info.height == 0 {
        return Err(VplError::invalid(format!(
            "{what} size {}x{}",
            info.width, info.height
        )));
    }
    Ok(())
}

fn check_strength(kind: FilterKind, strength: f64) -> Result<f64> {
    if strength.is_nan() || !(0.0..=MAX_FILTER_STRENGTH).contains(&strength) {
        return Err(VplError::invalid(format!(
            "{kind} strength {strength} outside 0..={MAX_FILTER_STRENGTH}"
        )));
    }
    Ok(strength)
}

fn collect(input: &FrameInfo, output: &FrameInfo, ops: &[VppOperation]) -> Result<Requested> {
    let mut req = Requested::default();

    for op in ops {
        let kind = op.kind();
        if !req.kinds.insert(kind) {
            return Err(VplError::invalid(format!("{kind} requested more than once")));
        }

        match *op {
            VppOperation::Crop { rect } => {
                if rect.is_empty() || !rect.fits_within(input.width, input.height) {
                    return Err(VplError::invalid(format!(
                        "crop {rect:?} outside {}x{} input",
                        input.width, input.height
                    )));
                }
                req.crop = Some(rect);
            }
            VppOperation::Scale { width, height } => {
                if width == 0 || height == 0 {
                    return Err(VplError::invalid(format!("scale to {width}x{height}")));
                }
                req.scale = Some((width, height));
            }
            VppOperation::ColorConvert => req.color_convert = true,
            VppOperation::Composite { dst } => {
                if dst.is_empty() || !dst.fits_within(output.width, output.height) {
                    return Err(VplError::invalid(format!(
                        "composite {dst:?} outside {}x{} output",
                        output.width, output.height
                    )));
                }
                req.composite = Some(dst);
            }
            VppOperation::Sharpen { strength } => {
                req.sharpen = Some(check_strength(kind, strength)?);
            }
            VppOperation::Blur { strength } => {
                req.blur = Some(check_strength(kind, strength)?);
            }
        }
    }

    Ok(req)
}

/// Enhance filters only run on 8-bit YUV
fn supports_enhance(format: VideoFormat) -> bool {
    matches!(format, VideoFormat::I420 | VideoFormat::NV12)
}

fn stage_output(op: &StageOp, current: StageSpec, target: StageSpec) -> StageSpec {
    match op {
        StageOp::Crop(rect) => StageSpec {
            width: rect.w,
            height: rect.h,
            ..current
        },
        StageOp::Scale | StageOp::Composite { .. } => StageSpec {
            width: target.width,
            height: target.height,
            ..current
        },
        StageOp::ColorConvert => StageSpec {
            format: target.format,
            ..current
        },
        StageOp::Sharpen { .. } | StageOp::Blur { .. } => current,
    }
}

/// Frames go through 1:1, so a channel may not ask for a different rate
fn check_frame_rate(input: &FrameInfo, output: &FrameInfo) -> Result<()> {
    let (src, dst) = (input.frame_rate, output.frame_rate);
    if src.is_set() && dst.is_set() && !src.same_rate(&dst) {
        return Err(VplError::incompatible(format!(
            "output frame rate {}/{} differs from input {}/{}",
            dst.num, dst.den, src.num, src.den
        )));
    }
    Ok(())
}

/// Compute the ordered stage list for one channel
///
/// Implied stages are added (color conversion when formats differ, scaling
/// when sizes differ), identity stages are elided unless `hints.do_use`
/// forces them, and the survivors are ordered by the policy selected from
/// `hints.target_usage`.
pub fn compute_stages(
    input: &FrameInfo,
    output: &FrameInfo,
    ops: &[VppOperation],
    hints: &VppHints,
) -> Result<PipelinePlan> {
    check_frame(input, "input")?;
    check_frame(output, "output")?;
    check_frame_rate(input, output)?;

    let req = collect(input, output, ops)?;

    if let Some(kind) = hints.do_use.intersection(&hints.do_not_use).next() {
        return Err(VplError::incompatible(format!(
            "{kind} is in both the do-use and do-not-use lists"
        )));
    }
    let forced = |kind: FilterKind| hints.do_use.contains(&kind);

    if (req.composite.is_some() || forced(FilterKind::Composite))
        && (req.scale.is_some() || forced(FilterKind::Scale))
    {
        return Err(VplError::incompatible(
            "composite cannot be combined with an independent scale",
        ));
    }
    if let Some((width, height)) = req.scale {
        if (width, height) != output.size() {
            return Err(VplError::invalid(format!(
                "scale target {width}x{height} differs from output {}x{}",
                output.width, output.height
            )));
        }
    }
    if let Some(kind) = req.kinds.intersection(&hints.do_not_use).next() {
        return Err(VplError::incompatible(format!(
            "{kind} is both requested and in the do-not-use list"
        )));
    }

    let src = StageSpec::of(input);
    let dst = StageSpec::of(output);

    let crop = req
        .crop
        .or_else(|| forced(FilterKind::Crop).then(|| Rect::full(input.width, input.height)))
        .filter(|rect| forced(FilterKind::Crop) || !rect.is_full_frame(input.width, input.height));
    let cropped = crop.map_or((src.width, src.height), |rect| (rect.w, rect.h));

    // A full-canvas composite is a plain scale unless composite is forced.
    let composite = req
        .composite
        .or_else(|| {
            forced(FilterKind::Composite).then(|| Rect::full(output.width, output.height))
        })
        .filter(|rect| {
            forced(FilterKind::Composite) || !rect.is_full_frame(output.width, output.height)
        });
    let resize = match composite {
        Some(rect) => Some(StageOp::Composite { dst: rect }),
        None if cropped != output.size() || forced(FilterKind::Scale) => Some(StageOp::Scale),
        None => None,
    };
    let color_convert = (input.format != output.format || forced(FilterKind::ColorConvert))
        .then_some(StageOp::ColorConvert);
    let enhance = |kind: FilterKind, requested: Option<f64>| {
        requested
            .or_else(|| forced(kind).then_some(DEFAULT_FILTER_STRENGTH))
            .filter(|s| *s > 0.0 || forced(kind))
    };
    let sharpen = enhance(FilterKind::Sharpen, req.sharpen).map(|strength| StageOp::Sharpen { strength });
    let blur = enhance(FilterKind::Blur, req.blur).map(|strength| StageOp::Blur { strength });

    let needed: Vec<StageOp> = [crop.map(StageOp::Crop), resize, color_convert, sharpen, blur]
        .into_iter()
        .flatten()
        .collect();
    if let Some(op) = needed.iter().find(|op| hints.do_not_use.contains(&op.kind())) {
        return Err(VplError::incompatible(format!(
            "{} is required for {src} -> {dst} but is in the do-not-use list",
            op.kind()
        )));
    }

    let policy = hints.target_usage.ordering();
    let ordered: Vec<StageOp> = match policy {
        OrderingPolicy::Quality => needed,
        OrderingPolicy::Speed => {
            let shrinking = dst.pixel_count() < cropped.0 as u64 * cropped.1 as u64;
            let csc_shrinks = output.format.bits_per_pixel() <= input.format.bits_per_pixel();
            [
                crop.map(StageOp::Crop),
                resize.filter(|_| shrinking),
                color_convert.filter(|_| csc_shrinks),
                sharpen,
                blur,
                color_convert.filter(|_| !csc_shrinks),
                resize.filter(|_| !shrinking),
            ]
            .into_iter()
            .flatten()
            .collect()
        }
    };

    let mut stages = Vec::with_capacity(ordered.len());
    let mut current = src;
    for op in ordered {
        if matches!(op, StageOp::Sharpen { .. } | StageOp::Blur { .. })
            && !supports_enhance(current.format)
        {
            return Err(VplError::incompatible(format!(
                "{} does not support {:?} frames",
                op.kind(),
                current.format
            )));
        }
        let next = stage_output(&op, current, dst);
        stages.push(Stage {
            op,
            input: current,
            output: next,
        });
        current = next;
    }
    debug_assert_eq!(current, dst, "planned pipeline must end at the output spec");

    let plan = PipelinePlan {
        input: src,
        output: dst,
        policy,
        stages,
    };
    log::debug!("vpp pipeline ({:?}): {}", policy, plan);

    Ok(plan)
}
