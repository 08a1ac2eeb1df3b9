use super::*;
use crate::foundation::time::Time;
use crate::graph::{EvalContext, ImageBuffer, InputValues, Value};

fn ctx(time: Time) -> EvalContext {
    EvalContext {
        time,
        width: 2,
        height: 1,
    }
}

fn image(v: &Value) -> &ImageBuffer {
    v.as_image().expect("image output")
}

#[test]
fn registry_knows_every_builtin() {
    for id in BUILTIN_OPS {
        assert_eq!(op_by_id(id).unwrap().id(), id);
    }
    assert!(op_by_id("blur").is_none());
}

#[test]
fn solid_premultiplies_color() {
    let mut inputs = InputValues::default();
    inputs.push("color", Value::Color([1.0, 0.5, 0.0, 0.5]));
    let out = SolidOp.value(&inputs, &ctx(Time::ZERO)).unwrap();
    let img = image(&out);
    assert_eq!((img.width(), img.height()), (2, 1));
    assert_eq!(img.pixels()[1], [0.5, 0.25, 0.0, 0.5]);
}

#[test]
fn opacity_scales_and_passes_through_missing_texture() {
    let mut inputs = InputValues::default();
    inputs.push(
        "texture",
        Value::Image(std::sync::Arc::new(ImageBuffer::filled(2, 1, [1.0; 4]))),
    );
    inputs.push("opacity", Value::Float(25.0));
    let out = OpacityOp.value(&inputs, &ctx(Time::ZERO)).unwrap();
    assert_eq!(image(&out).pixels()[0], [0.25; 4]);

    let mut empty = InputValues::default();
    empty.push("texture", Value::None);
    empty.push("opacity", Value::Float(25.0));
    assert_eq!(OpacityOp.value(&empty, &ctx(Time::ZERO)).unwrap(), Value::None);
}

#[test]
fn merge_composites_source_over() {
    let mut inputs = InputValues::default();
    inputs.push(
        "base",
        Value::Image(std::sync::Arc::new(ImageBuffer::filled(
            2,
            1,
            [0.0, 0.0, 1.0, 1.0],
        ))),
    );
    inputs.push(
        "blend",
        Value::Image(std::sync::Arc::new(ImageBuffer::filled(
            2,
            1,
            [0.5, 0.0, 0.0, 0.5],
        ))),
    );
    let out = MergeOp.value(&inputs, &ctx(Time::ZERO)).unwrap();
    assert_eq!(image(&out).pixels()[0], [0.5, 0.0, 0.5, 1.0]);
}

#[test]
fn ramp_is_time_variant() {
    assert!(RampOp.is_time_variant());
    assert!(!SolidOp.is_time_variant());
    let mut inputs = InputValues::default();
    inputs.push("period", Value::Float(2.0));
    let out = RampOp.value(&inputs, &ctx(Time::from_secs(1))).unwrap();
    assert_eq!(image(&out).pixels()[0], [0.5, 0.5, 0.5, 1.0]);
}

#[test]
fn viewer_classifies_its_inputs() {
    use crate::graph::ChangeKind;
    assert!(ViewerOp.is_viewer());
    assert_eq!(ViewerOp.classify_change(viewer::LENGTH), ChangeKind::Length);
    assert_eq!(ViewerOp.classify_change(viewer::WIDTH), ChangeKind::VideoParams);
    assert_eq!(ViewerOp.classify_change(viewer::TIME_BASE), ChangeKind::VideoParams);
    assert_eq!(ViewerOp.classify_change(viewer::TEXTURE), ChangeKind::Content);
}

#[test]
fn tone_fills_every_channel_and_has_no_picture() {
    use crate::foundation::time::TimeRange;
    use crate::graph::AudioContext;
    let mut inputs = InputValues::default();
    inputs.push("frequency", Value::Float(1.0));
    inputs.push("gain", Value::Float(0.5));
    let block = AudioContext {
        range: TimeRange::new(Time::ZERO, Time::from_secs(1)),
        sample_rate: 4,
        channels: 2,
    };
    let out = ToneOp.samples(&inputs, &block).unwrap();
    let samples = out.as_samples().unwrap();
    assert_eq!(samples.data().len(), 8);
    // Frame 1 is a quarter period in.
    assert!((samples.data()[2] - 0.5).abs() < 1e-6);
    assert_eq!(samples.data()[2], samples.data()[3]);

    assert!(matches!(
        ToneOp.value(&inputs, &ctx(Time::ZERO)).unwrap(),
        Value::None
    ));
    assert!(matches!(
        SolidOp.samples(&inputs, &block).unwrap(),
        Value::None
    ));
}
