mod common;

use chrono::Duration;
use futures::future::join_all;
use std::sync::Arc;

use cinema_booking::error::{BookingError, ConflictReason, ValidationReason};
use cinema_booking::models::{SeatPosition, SeatStatus};
use common::{app, app_with_mailer, booked_setup, reservation, Caller, FailingMailer};

#[tokio::test]
async fn reserve_then_sell_then_conflict() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let owner = Caller::user(7);

    let created = t
        .state
        .reservations
        .create(&owner, reservation(screening.id, &[(1, 1), (1, 2)]))
        .await
        .unwrap();
    assert_eq!(created.seats.len(), 2);
    assert!(created.seats.iter().all(|s| s.status == SeatStatus::Reserved));
    assert!(created.seats.iter().all(|s| s.reservation_id == Some(created.reservation.id)));
    assert_eq!(created.reservation.owner_user_id, 7);

    let sold = t.state.screenings.sell_seat(screening.id, SeatPosition::new(1, 1)).await;
    assert!(matches!(
        sold,
        Err(BookingError::Conflict(ConflictReason::AlreadyOccupied(p))) if p == SeatPosition::new(1, 1)
    ));

    let sold = t.state.screenings.sell_seat(screening.id, SeatPosition::new(5, 5)).await.unwrap();
    assert_eq!(sold.status, SeatStatus::Sold);
    assert_eq!(sold.reservation_id, None);

    let seats = t.state.screenings.get_seats_by_screening(screening.id).await.unwrap();
    assert_eq!(seats.len(), 3);

    let out_of_range = t.state.reservations.create(&owner, reservation(screening.id, &[(11, 1)])).await;
    assert!(matches!(
        out_of_range,
        Err(BookingError::Validation(ValidationReason::OutOfRange(p))) if p == SeatPosition::new(11, 1)
    ));
}

#[tokio::test]
async fn selection_rules_are_enforced() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let caller = Caller::user(1);
    let lifecycle = &t.state.reservations;

    let empty = lifecycle.create(&caller, reservation(screening.id, &[])).await;
    assert!(matches!(empty, Err(BookingError::Validation(ValidationReason::EmptySelection))));

    let seven: Vec<(i32, i32)> = (1..=7).map(|c| (2, c)).collect();
    let too_many = lifecycle.create(&caller, reservation(screening.id, &seven)).await;
    assert!(matches!(too_many, Err(BookingError::Validation(ValidationReason::TooManySeats { max: 6 }))));

    let dup = lifecycle.create(&caller, reservation(screening.id, &[(3, 3), (3, 3)])).await;
    assert!(matches!(dup, Err(BookingError::Validation(ValidationReason::DuplicatePosition(_)))));

    let mut mismatch = reservation(screening.id, &[(4, 4)]);
    mismatch.seats[0].screening_id = Some(screening.id + 100);
    let mismatch = lifecycle.create(&caller, mismatch).await;
    assert!(matches!(mismatch, Err(BookingError::Validation(ValidationReason::ScreeningMismatch))));

    let missing = lifecycle.create(&caller, reservation(screening.id + 100, &[(1, 1)])).await;
    assert!(matches!(missing, Err(BookingError::NotFound("Screening"))));

    let mut bad_phone = reservation(screening.id, &[(1, 1)]);
    bad_phone.phone = "call me".into();
    let bad_phone = lifecycle.create(&caller, bad_phone).await;
    assert!(matches!(bad_phone, Err(BookingError::Validation(ValidationReason::InvalidInput(_)))));

    // nothing was written by the rejected attempts
    assert!(t.state.screenings.get_seats_by_screening(screening.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn six_seats_is_the_limit_not_beyond() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let six: Vec<(i32, i32)> = (1..=6).map(|c| (9, c)).collect();
    let created = t.state.reservations.create(&Caller::user(1), reservation(screening.id, &six)).await.unwrap();
    assert_eq!(created.seats.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_reservations_all_commit() {
    let t = app();
    let screening = booked_setup(&t.state).await;

    let attempts = (1..=10).map(|column| {
        let state = t.state.clone();
        tokio::spawn(async move {
            state
                .reservations
                .create(&Caller::user(i64::from(column)), reservation(screening.id, &[(2, column)]))
                .await
        })
    });
    let results = join_all(attempts).await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let seats = t.state.screenings.get_seats_by_screening(screening.id).await.unwrap();
    assert_eq!(seats.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_seat_have_one_winner() {
    let t = app();
    let screening = booked_setup(&t.state).await;

    let attempts = (1..=8).map(|user| {
        let state = t.state.clone();
        tokio::spawn(async move {
            state.reservations.create(&Caller::user(user), reservation(screening.id, &[(3, 3), (3, 4)])).await
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, BookingError::Conflict(ConflictReason::AlreadyOccupied(_)))));
    assert_eq!(t.state.screenings.get_seats_by_screening(screening.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn owner_and_admin_access() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let owner = Caller::user(7);
    let stranger = Caller::user(8);

    let mine = t.state.reservations.create(&owner, reservation(screening.id, &[(1, 1)])).await.unwrap();
    t.state.reservations.create(&stranger, reservation(screening.id, &[(1, 2)])).await.unwrap();

    let id = mine.reservation.id;
    assert!(t.state.reservations.get_by_id(&owner, id).await.is_ok());
    assert!(matches!(t.state.reservations.get_by_id(&stranger, id).await, Err(BookingError::AccessDenied)));
    assert!(t.state.reservations.get_by_id(&Caller::admin(), id).await.is_ok());
    assert!(matches!(
        t.state.reservations.get_by_id(&owner, id + 999).await,
        Err(BookingError::NotFound("Reservation"))
    ));

    assert_eq!(t.state.reservations.get_all(&owner).await.unwrap().len(), 1);
    assert_eq!(t.state.reservations.get_all(&Caller::admin()).await.unwrap().len(), 2);

    assert!(matches!(t.state.reservations.cancel(&stranger, id).await, Err(BookingError::AccessDenied)));
}

#[tokio::test]
async fn cancel_releases_seats_before_start() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let owner = Caller::user(7);

    let created = t.state.reservations.create(&owner, reservation(screening.id, &[(1, 1), (1, 2)])).await.unwrap();
    t.state.reservations.cancel(&owner, created.reservation.id).await.unwrap();

    assert!(t.state.screenings.get_seats_by_screening(screening.id).await.unwrap().is_empty());
    assert!(matches!(
        t.state.reservations.get_by_id(&owner, created.reservation.id).await,
        Err(BookingError::NotFound(_))
    ));

    // the positions are free again
    t.state.reservations.create(&owner, reservation(screening.id, &[(1, 1)])).await.unwrap();
}

#[tokio::test]
async fn cancel_after_start_is_rejected() {
    let t = app();
    let room = common::room(&t.state, "Past", 5, 5).await;
    let movie = common::movie(&t.state, "Yesterday", 90).await;
    let started = common::screening(&t.state, &room, &movie, chrono::Utc::now() - Duration::hours(1)).await;
    let owner = Caller::user(3);

    let created = t.state.reservations.create(&owner, reservation(started.id, &[(1, 1)])).await.unwrap();
    let result = t.state.reservations.cancel(&owner, created.reservation.id).await;
    assert!(matches!(result, Err(BookingError::Validation(ValidationReason::CancelAfterStart))));
    assert_eq!(t.state.screenings.get_seats_by_screening(started.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn confirmation_mail_lists_the_seats() {
    let t = app();
    let screening = booked_setup(&t.state).await;
    let created = t
        .state
        .reservations
        .create(&Caller::user(1), reservation(screening.id, &[(1, 2), (4, 5)]))
        .await
        .unwrap();

    let sent = t.mailer.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    let (to, subject, body) = &sent[0];
    assert_eq!(to, &created.reservation.email);
    assert_eq!(subject, "[Cinema] New reservation");
    assert!(body.contains("Arrival"));
    assert!(body.contains("(Row 1, Col 2)"));
    assert!(body.contains("(Row 4, Col 5)"));
}

#[tokio::test]
async fn failing_mailer_does_not_affect_booking() {
    let state = app_with_mailer(Arc::new(FailingMailer));
    let screening = booked_setup(&state).await;

    let created = state.reservations.create(&Caller::user(1), reservation(screening.id, &[(1, 1)])).await;
    assert!(created.is_ok());
    tokio::task::yield_now().await;
    assert_eq!(state.screenings.get_seats_by_screening(screening.id).await.unwrap().len(), 1);
}
