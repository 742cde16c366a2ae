use ndarray::{Array2, Axis};

use mlp_classifier::{
    MlErr,
    arch::{Architecture, Classifier, Mode},
    initialization::Init,
};

fn inputs(rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 7 + j * 3) % 11) as f32 / 11. - 0.5)
}

#[test]
fn forward_returns_log_probabilities_for_every_architecture() {
    let architectures: [(usize, usize, Vec<usize>); 4] = [
        (3, 2, vec![]),
        (3, 3, vec![]),
        (5, 4, vec![7]),
        (8, 10, vec![16, 12, 6]),
    ];

    for (input_size, output_size, hidden) in architectures {
        let mut model = Classifier::builder(input_size, output_size)
            .hidden_sizes(&hidden)
            .seed(Some(21))
            .build()
            .unwrap();

        for mode in [Mode::Train, Mode::Eval] {
            model.set_mode(mode);
            let out = model.forward(inputs(9, input_size).view()).unwrap();

            assert_eq!(out.dim(), (9, output_size));
            for total in out.mapv(f32::exp).sum_axis(Axis(1)).iter() {
                assert!((total - 1.).abs() < 1e-5, "row sums to {total}");
            }
        }
    }
}

#[test]
fn untrained_model_is_near_uniform_on_zero_input() {
    let mut model = Classifier::new(784, 10, &[128, 64]).unwrap();
    model.set_mode(Mode::Eval);

    let probs = model.predict(Array2::zeros((64, 784)).view()).unwrap();

    assert_eq!(probs.dim(), (64, 10));
    assert!(probs.iter().all(|p| (p - 0.1).abs() < 0.05), "{probs}");
}

#[test]
fn evaluation_is_deterministic_and_training_is_not() {
    let mut model = Classifier::builder(6, 3)
        .hidden_sizes(&[32, 32])
        .seed(Some(4))
        .build()
        .unwrap();
    let x = inputs(8, 6);

    model.set_mode(Mode::Eval);
    let a = model.forward(x.view()).unwrap();
    let b = model.forward(x.view()).unwrap();
    assert_eq!(a, b);

    model.set_mode(Mode::Train);
    let a = model.forward(x.view()).unwrap();
    let b = model.forward(x.view()).unwrap();
    assert_ne!(a, b);
}

#[test]
fn zero_dropout_makes_training_mode_deterministic() {
    let mut model = Classifier::builder(6, 3)
        .hidden_sizes(&[32])
        .dropout(0.)
        .seed(Some(4))
        .build()
        .unwrap();
    let x = inputs(8, 6);

    let train = model.forward(x.view()).unwrap();
    model.set_mode(Mode::Eval);
    let eval = model.forward(x.view()).unwrap();

    assert_eq!(train, eval);
}

#[test]
fn wrong_input_width_names_both_shapes() {
    let mut model = Classifier::new(4, 2, &[3]).unwrap();

    let err = model.forward(inputs(5, 6).view()).unwrap_err();

    let MlErr::ShapeMismatch { got, expected, .. } = &err else {
        panic!("expected a shape mismatch, got {err}");
    };
    assert_eq!(got, &[5, 6]);
    assert_eq!(expected, &[5, 4]);
    assert!(err.to_string().contains("[5, 6]"));
}

#[test]
fn no_grad_scope_is_restored_after_an_error() {
    let mut model = Classifier::new(4, 2, &[3]).unwrap();

    assert!(model.predict(inputs(2, 5).view()).is_err());
    assert!(model.grad_enabled());

    {
        let mut scoped = model.no_grad();
        assert!(scoped.forward(inputs(2, 5).view()).is_err());
        assert!(!scoped.grad_enabled());
    }
    assert!(model.grad_enabled());
}

#[test]
fn nested_no_grad_scopes_restore_in_order() {
    let mut model = Classifier::new(4, 2, &[]).unwrap();

    let mut outer = model.no_grad();
    {
        let inner = outer.no_grad();
        assert!(!inner.grad_enabled());
    }
    assert!(!outer.grad_enabled());
    drop(outer);

    assert!(model.grad_enabled());
}

#[test]
fn architecture_is_read_off_the_layers() {
    let model = Classifier::builder(784, 10)
        .hidden_sizes(&[512, 256, 128])
        .init(Init::Const { value: 0. })
        .build()
        .unwrap();

    assert_eq!(
        model.architecture(),
        Architecture::new(784, 10, &[512, 256, 128])
    );
    assert_eq!(model.size(), model.architecture().size());
}

#[test]
fn predicted_probabilities_sum_to_one() {
    let mut model = Classifier::new(5, 4, &[6]).unwrap();
    model.set_mode(Mode::Eval);

    let probs = model.predict(inputs(3, 5).view()).unwrap();

    for row in probs.rows() {
        assert!((row.sum() - 1.).abs() < 1e-5);
        assert!(row.iter().all(|&p| p > 0.));
    }
}
