#[cfg(all(test, feature = "loom"))]
mod tests {
    use crate::{region_size_for, CircularByteBuffer, Consumer, Notification, OverflowPlacement};
    use loom::{model::Builder, thread};

    fn model(f: impl Fn() + Sync + Send + 'static) {
        let mut builder = Builder::new();
        if builder.preemption_bound.is_none() {
            builder.preemption_bound = Some(3);
        }
        builder.check(f);
    }

    #[test]
    fn test_single_producer_single_consumer_order() {
        model(|| {
            let placement = OverflowPlacement::LastByte;
            let mut producer =
                CircularByteBuffer::new(region_size_for(2, placement), placement).unwrap();
            let mut consumer = Consumer::attach(&producer).unwrap();

            let message = [1u8, 2, 3];

            let producer_handle = thread::spawn(move || {
                let mut sent = 0;
                while sent < message.len() {
                    let n = producer.write(&message[sent..]);
                    sent += n;
                    if n == 0 {
                        thread::yield_now();
                    }
                }
            });

            let mut received = vec![];
            let mut buf = [0u8; 2];
            while received.len() < message.len() {
                let n = consumer.read(&mut buf);
                if n == 0 {
                    thread::yield_now();
                    continue;
                }
                received.extend_from_slice(&buf[..n]);
            }

            producer_handle.join().unwrap();
            assert_eq!(received, message);
        });
    }

    #[test]
    fn test_commit_publishes_payload() {
        model(|| {
            let placement = OverflowPlacement::Internal;
            let mut producer =
                CircularByteBuffer::new(region_size_for(4, placement), placement).unwrap();
            let consumer = Consumer::attach(&producer).unwrap();

            let producer_handle = thread::spawn(move || {
                let window = producer.write_contiguous();
                window[..2].copy_from_slice(&[7, 9]);
                producer.commit(2).unwrap();
            });

            let visible = consumer.read_contiguous().to_vec();
            assert!(visible.is_empty() || visible == [7, 9]);

            producer_handle.join().unwrap();
            assert_eq!(consumer.read_contiguous(), &[7, 9]);
        });
    }

    #[test]
    fn test_one_wait_covers_repeated_notifications() {
        model(|| {
            let placement = OverflowPlacement::LastByte;
            let mut producer =
                CircularByteBuffer::new(region_size_for(4, placement), placement).unwrap();
            let notification = Notification::new().unwrap();
            let consumer = Consumer::attach(&producer)
                .unwrap()
                .with_notification(notification.try_clone().unwrap());

            let producer_handle = thread::spawn(move || {
                assert_eq!(producer.write(&[4, 2]), 2);
                for _ in 0..3 {
                    notification.notify().unwrap();
                }
                notification
            });

            consumer.wait().unwrap();
            assert_eq!(consumer.read_contiguous(), &[4, 2]);

            let notification = producer_handle.join().unwrap();
            assert!(notification.pending().unwrap() <= 2);
        });
    }
}
