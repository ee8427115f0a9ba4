//! End-to-end tests assembling real chains through [`taskchain::ChainBuilder`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use taskchain::chain::{ChainBuilder, ContainingTask};
use taskchain::config::StreamConfig;
use taskchain::error::OutputWriteError;
use taskchain::output::network::{BroadcastEvent, RecordWriter};
use taskchain::output_tag::ErasedOutputTag;
use taskchain::record::ErasedRecord;
use taskchain::test_support::TestFactory;
use taskchain::{OutputTag, StreamEdge, StreamRecord, StreamStatus, Watermark};

#[derive(Default)]
struct CapturedWriter {
    records: Rc<RefCell<Vec<(Option<String>, i32)>>>,
    events: Rc<RefCell<Vec<BroadcastEvent>>>,
    closed: Rc<Cell<bool>>,
}

impl RecordWriter for CapturedWriter {
    fn emit(&mut self, tag: Option<&ErasedOutputTag>, record: ErasedRecord) -> Result<(), OutputWriteError> {
        let value = *record.downcast::<i32>().map_err(|_| OutputWriteError::new("expected i32")).unwrap().value();
        self.records.borrow_mut().push((tag.map(|t| t.id().to_string()), value));
        Ok(())
    }

    fn broadcast_event(&mut self, event: BroadcastEvent) -> Result<(), OutputWriteError> {
        self.events.borrow_mut().push(event);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputWriteError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputWriteError> {
        self.closed.set(true);
        Ok(())
    }
}

struct NoopWriter {
    closed: Rc<Cell<bool>>,
}

impl RecordWriter for NoopWriter {
    fn emit(&mut self, _tag: Option<&ErasedOutputTag>, _record: ErasedRecord) -> Result<(), OutputWriteError> {
        Ok(())
    }
    fn broadcast_event(&mut self, _event: BroadcastEvent) -> Result<(), OutputWriteError> {
        Ok(())
    }
    fn flush(&mut self) -> Result<(), OutputWriteError> {
        Ok(())
    }
    fn close(&mut self) -> Result<(), OutputWriteError> {
        self.closed.set(true);
        Ok(())
    }
}

struct ObjectReuse(bool);
impl ContainingTask for ObjectReuse {
    fn is_object_reuse_enabled(&self) -> bool {
        self.0
    }
}

#[test]
fn single_chain_counts_records_and_forwards_incremented_values() {
    let factory = TestFactory::new();
    factory.register_identity("H");
    factory.register_increment("C");

    let mut root = StreamConfig::new("H");
    root.chained_outputs.push(StreamEdge::new("H", "C"));
    let mut config_c = StreamConfig::new("C");
    config_c.non_chained_outputs.push(StreamEdge::new("C", "N"));
    root.chained_configs.push(("C".to_string(), config_c));

    let records = Rc::new(RefCell::new(Vec::new()));
    let events = Rc::new(RefCell::new(Vec::new()));
    let writer = CapturedWriter {
        records: records.clone(),
        events,
        closed: Rc::new(Cell::new(false)),
    };

    let task = ObjectReuse(true);
    let builder = ChainBuilder::new(&task, &factory, vec![Box::new(writer)]);
    let mut chain = builder.build(&root).expect("chain builds");

    for value in [1, 2, 3] {
        chain
            .chain_entry_point()
            .collect(StreamRecord::new(value).erase())
            .unwrap();
    }

    let forwarded: Vec<i32> = records.borrow().iter().map(|(_, v)| *v).collect();
    assert_eq!(forwarded, vec![2, 3, 4]);

    assert_eq!(chain.chain_length(), 2);
    for operator in chain.all_operators() {
        assert_eq!(operator.borrow().metric_group().num_records_in.get(), 3);
    }
}

#[test]
fn two_input_head_finalizes_bounded_downstream_only_once_both_inputs_end() {
    let factory = TestFactory::new();
    let ended_inputs = Rc::new(RefCell::new(Vec::new()));
    let end_input_calls = Rc::new(RefCell::new(0usize));
    {
        let ended_inputs = ended_inputs.clone();
        factory.register(
            "H",
            Box::new(move |output| {
                Rc::new(RefCell::new(taskchain::Erase::new(
                    taskchain::test_support::TwoInputHead::new("H", ended_inputs.clone()),
                    output,
                )))
            }),
        );
    }
    {
        let end_input_calls = end_input_calls.clone();
        factory.register(
            "C",
            Box::new(move |output| {
                Rc::new(RefCell::new(taskchain::Erase::new(
                    taskchain::test_support::BoundedSink::new("C", end_input_calls.clone()),
                    output,
                )))
            }),
        );
    }

    let mut root = StreamConfig::new("H");
    root.chained_outputs.push(StreamEdge::new("H", "C"));
    let mut config_c = StreamConfig::new("C");
    config_c.non_chained_outputs.push(StreamEdge::new("C", "N"));
    root.chained_configs.push(("C".to_string(), config_c));

    let writer = NoopWriter { closed: Rc::new(Cell::new(false)) };
    let task = ObjectReuse(true);
    let builder = ChainBuilder::new(&task, &factory, vec![Box::new(writer)]);
    let mut chain = builder.build(&root).expect("chain builds");

    chain.end_input(1).unwrap();
    assert_eq!(*ended_inputs.borrow(), vec![1]);
    assert_eq!(*end_input_calls.borrow(), 0);

    chain.end_input(2).unwrap();
    assert_eq!(*ended_inputs.borrow(), vec![1, 2]);
    assert_eq!(*end_input_calls.borrow(), 1);

    chain.end_input(1).unwrap();
    chain.end_input(2).unwrap();
    assert_eq!(*end_input_calls.borrow(), 1);
}

#[test]
fn idle_status_gates_watermark_forwarding_while_gauge_still_advances() {
    let factory = TestFactory::new();
    factory.register_identity("H");

    let mut root = StreamConfig::new("H");
    root.non_chained_outputs.push(StreamEdge::new("H", "N"));

    let events = Rc::new(RefCell::new(Vec::new()));
    let writer = CapturedWriter {
        records: Rc::new(RefCell::new(Vec::new())),
        events: events.clone(),
        closed: Rc::new(Cell::new(false)),
    };
    let task = ObjectReuse(true);
    let builder = ChainBuilder::new(&task, &factory, vec![Box::new(writer)]);
    let mut chain = builder.build(&root).expect("chain builds");

    chain.toggle_stream_status(StreamStatus::Idle).unwrap();
    chain.chain_entry_point().emit_watermark(Watermark::new(100)).unwrap();
    assert_eq!(chain.chain_entry_point().watermark_gauge(), 100);
    assert!(events.borrow().iter().all(|e| !matches!(e, BroadcastEvent::Watermark(_))));

    chain.toggle_stream_status(StreamStatus::Active).unwrap();
    chain.chain_entry_point().emit_watermark(Watermark::new(200)).unwrap();
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, BroadcastEvent::Watermark(w) if w.timestamp() == 200)));
}

#[test]
fn construction_failure_closes_every_network_output_created_so_far() {
    let factory = TestFactory::new();
    factory.register_identity("R");
    factory.register_identity("X");
    // "Y" intentionally left unregistered so construction fails while instantiating it.

    let mut root = StreamConfig::new("R");
    root.non_chained_outputs.push(StreamEdge::new("R", "N1"));
    root.chained_outputs.push(StreamEdge::new("R", "X"));

    let mut config_x = StreamConfig::new("X");
    config_x.non_chained_outputs.push(StreamEdge::new("X", "N2"));
    config_x.chained_outputs.push(StreamEdge::new("X", "Y"));
    let config_y = StreamConfig::new("Y");
    config_x.chained_configs.push(("Y".to_string(), config_y));
    root.chained_configs.push(("X".to_string(), config_x));

    let closed_1 = Rc::new(Cell::new(false));
    let closed_2 = Rc::new(Cell::new(false));
    let writers: Vec<Box<dyn RecordWriter>> = vec![
        Box::new(NoopWriter { closed: closed_1.clone() }),
        Box::new(NoopWriter { closed: closed_2.clone() }),
    ];

    let task = ObjectReuse(true);
    let builder = ChainBuilder::new(&task, &factory, writers);
    let result = builder.build(&root);

    assert!(result.is_err());
    assert!(closed_1.get(), "first network output must be closed on construction failure");
    assert!(closed_2.get(), "second network output must be closed on construction failure");
}

#[test]
fn side_output_only_reaches_the_sink_bound_to_its_tag() {
    let factory = TestFactory::new();
    factory.register_identity("H");
    let tag = OutputTag::<i32>::new("late").erase();
    factory.register_tag("H", "N", tag.clone());

    let mut root = StreamConfig::new("H");
    root.non_chained_outputs
        .push(StreamEdge::new("H", "N").with_output_tag("late"));

    let records = Rc::new(RefCell::new(Vec::new()));
    let writer = CapturedWriter {
        records: records.clone(),
        events: Rc::new(RefCell::new(Vec::new())),
        closed: Rc::new(Cell::new(false)),
    };
    let task = ObjectReuse(true);
    let builder = ChainBuilder::new(&task, &factory, vec![Box::new(writer)]);
    let mut chain = builder.build(&root).expect("chain builds");

    chain
        .chain_entry_point()
        .collect_tagged(&tag, StreamRecord::new(42i32).erase())
        .unwrap();

    assert_eq!(records.borrow().as_slice(), &[(Some("late".to_string()), 42)]);
}
