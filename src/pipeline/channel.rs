use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Occupancy and acknowledgement counters of a bounded queue.
///
/// `depth` counts items sitting in the queue. `unfinished` counts items that
/// were enqueued but not yet acknowledged by the consumer, which is what
/// [`QueueGauge::join`] waits on.
#[derive(Debug)]
pub struct QueueGauge {
    capacity: usize,
    depth: AtomicUsize,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl QueueGauge {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            depth: AtomicUsize::new(0),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Current number of queued items and the fixed capacity
    pub fn occupancy(&self) -> (usize, usize) {
        (self.depth.load(Ordering::Acquire), self.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Acquire)
    }

    /// Wait until every enqueued item has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn enqueued(&self) {
        self.unfinished.fetch_add(1, Ordering::AcqRel);
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    fn dequeued(&self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }

    fn acknowledge(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.drained.notify_waiters();
        }
    }
}

/// Producer half of a gauged bounded queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    gauge: Arc<QueueGauge>,
}

impl<T> QueueSender<T> {
    pub fn capacity(&self) -> usize {
        self.gauge.capacity()
    }

    /// Wait for a free slot and hold it. Fails once the receiver is gone.
    ///
    /// A held slot is not counted as queued until an item is sent through it.
    pub async fn reserve(&self) -> Result<QueuePermit<'_, T>, mpsc::error::SendError<()>> {
        let permit = self.tx.reserve().await?;
        Ok(QueuePermit {
            permit,
            gauge: &self.gauge,
        })
    }

    /// Wait for a free slot, then enqueue. Fails once the receiver is gone.
    pub async fn send(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        match self.reserve().await {
            Ok(permit) => {
                permit.send(item);
                Ok(())
            }
            Err(_) => Err(mpsc::error::SendError(item)),
        }
    }
}

/// A reserved queue slot. Dropping it releases the slot unused.
pub struct QueuePermit<'a, T> {
    permit: mpsc::Permit<'a, T>,
    gauge: &'a QueueGauge,
}

impl<T> QueuePermit<'_, T> {
    pub fn send(self, item: T) {
        // Count before the item becomes visible so depth never underflows
        self.gauge.enqueued();
        self.permit.send(item);
    }
}

/// Consumer half of a gauged bounded queue.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    gauge: Arc<QueueGauge>,
}

impl<T> QueueReceiver<T> {
    /// Receive the next item. Returns None once all senders are dropped and
    /// the queue is empty. Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.gauge.dequeued();
        }
        item
    }

    /// Mark one previously received item as fully processed.
    pub fn task_done(&self) {
        self.gauge.acknowledge();
    }

    pub fn gauge(&self) -> &Arc<QueueGauge> {
        &self.gauge
    }
}

/// Create a bounded queue holding at most `capacity` items.
///
/// A zero capacity is raised to one.
pub fn create_queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let gauge = Arc::new(QueueGauge::new(capacity));

    (
        QueueSender {
            tx,
            gauge: Arc::clone(&gauge),
        },
        QueueReceiver { rx, gauge },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_occupancy_tracks_depth() {
        let (tx, mut rx) = create_queue::<u32>(3);
        assert_eq!(rx.gauge().occupancy(), (0, 3));

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(rx.gauge().occupancy(), (2, 3));

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.gauge().occupancy(), (1, 3));
    }

    #[tokio::test]
    async fn test_send_blocks_when_full() {
        let (tx, mut rx) = create_queue::<u32>(1);
        tx.send(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err(), "send should wait for capacity");

        assert_eq!(rx.recv().await, Some(1));
        tx.send(3).await.unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_reserved_slot_is_not_counted_as_queued() {
        let (tx, mut rx) = create_queue::<u32>(1);

        let permit = tx.reserve().await.unwrap();
        assert_eq!(rx.gauge().occupancy(), (0, 1));
        // The only slot is held, so a second sender has to wait
        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err());

        permit.send(1);
        assert_eq!(rx.gauge().occupancy(), (1, 1));
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_dropped_permit_frees_slot() {
        let (tx, mut rx) = create_queue::<u32>(1);
        drop(tx.reserve().await.unwrap());

        tx.send(7).await.unwrap();
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.gauge().unfinished(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        let (tx, rx) = create_queue::<u32>(0);
        assert_eq!(rx.gauge().capacity(), 1);
        tx.send(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_fails_without_receiver() {
        let (tx, rx) = create_queue::<u32>(1);
        drop(rx);
        assert!(tx.send(1).await.is_err());
    }

    #[tokio::test]
    async fn test_join_waits_for_acknowledgement() {
        let (tx, mut rx) = create_queue::<u32>(2);
        let gauge = Arc::clone(rx.gauge());

        // Nothing enqueued yet
        gauge.join().await;

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        let waiter = tokio::spawn({
            let gauge = Arc::clone(&gauge);
            async move { gauge.join().await }
        });

        rx.recv().await.unwrap();
        rx.task_done();
        rx.recv().await.unwrap();
        assert_eq!(gauge.unfinished(), 1);
        assert!(!waiter.is_finished());

        rx.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join should resolve after the last acknowledgement")
            .unwrap();
        assert_eq!(gauge.unfinished(), 0);
    }

    #[test]
    fn test_acknowledge_never_underflows() {
        let gauge = QueueGauge::new(1);
        gauge.acknowledge();
        assert_eq!(gauge.unfinished(), 0);
    }
}
