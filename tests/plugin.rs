//! The installed plugin is process-wide, so everything touching it lives in
//! one test.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axerrno::AxError;
use axpep::{
    acpi, CategoryMask, DeviceDefinition, DeviceMatchEntry, DeviceType, DispatchOutcome,
    DispatchRequest, HandlerRequest, HandlerResult, HandlerSlot, HandlerTable, HostInterface,
    KernelHandle, MatchMode, NotificationCategory, Payload, PepConfig, WorkInfo,
};

fn config() -> PepConfig {
    let fan = DeviceDefinition::new(DeviceType(2)).with_handlers(
        NotificationCategory::Acpi,
        HandlerTable::new().with_entry(
            acpi::EVALUATE_CONTROL_METHOD,
            HandlerSlot::new().with_deferred(
                |_: &mut HandlerRequest<'_>, _: Option<&mut WorkInfo>| HandlerResult::Complete(Ok(())),
            ),
        ),
    );
    PepConfig::new(
        DeviceDefinition::new(DeviceType(1)),
        DeviceMatchEntry::new(DeviceType(1), CategoryMask::ACPI, "\\_SB.PEP0", MatchMode::Full),
    )
    .with_child(
        fan,
        DeviceMatchEntry::new(DeviceType(2), CategoryMask::ACPI, "FAN", MatchMode::Partial),
    )
}

#[test]
fn test_single_plugin_lifecycle() {
    let mut payload = Payload::prepare("\\_SB.FAN0");
    assert!(!axpep::notify(NotificationCategory::Acpi, acpi::PREPARE_DEVICE, &mut payload));
    assert!(axpep::active_engine().is_none());
    assert_eq!(axpep::unregister_plugin(), Err(AxError::NotFound));

    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    let engine = axpep::register_plugin(
        config(),
        HostInterface::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    assert!(Arc::ptr_eq(&engine, &axpep::active_engine().unwrap()));

    let second = axpep::register_plugin(config(), HostInterface::new(|| {}));
    assert_eq!(second.err(), Some(AxError::AlreadyExists));

    let mut payload = Payload::prepare("\\_SB.FAN0");
    assert!(axpep::notify(NotificationCategory::Acpi, acpi::PREPARE_DEVICE, &mut payload));
    assert!(matches!(payload, Payload::PrepareDevice { accepted: true, .. }));

    let mut payload = Payload::register("\\_SB.FAN0", KernelHandle(7));
    assert!(axpep::notify(NotificationCategory::Acpi, acpi::REGISTER_DEVICE, &mut payload));
    let Payload::RegisterDevice {
        result: Some(Ok(handle)),
        ..
    } = payload
    else {
        panic!("registration failed");
    };

    let mut payload = Payload::device(handle, DispatchRequest::empty());
    assert!(axpep::notify(
        NotificationCategory::Acpi,
        acpi::EVALUATE_CONTROL_METHOD,
        &mut payload
    ));
    assert!(matches!(
        payload,
        Payload::Device {
            outcome: Some(Ok(DispatchOutcome::MoreWorkScheduled)),
            ..
        }
    ));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(engine.completed_count(), 1);

    // Tearing down drops the undelivered completion and the device.
    axpep::unregister_plugin().unwrap();
    assert!(axpep::active_engine().is_none());
    assert_eq!(engine.device_count(), 0);
    assert_eq!(engine.completed_count(), 0);

    let mut payload = Payload::work();
    assert!(!axpep::notify(NotificationCategory::Acpi, acpi::WORK, &mut payload));

    // A new plugin can be installed afterwards.
    axpep::register_plugin(config(), HostInterface::new(|| {})).unwrap();
    axpep::unregister_plugin().unwrap();
}
