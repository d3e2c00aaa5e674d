use std::future::Future;
use std::io;
use std::num::ParseIntError;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::executor::block_on;
use futures::future::{ready, BoxFuture};
use futures::task::noop_waker_ref;
use stateful_macros::resumable;

/// Pending on the first poll, ready on the second.
struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    fn new() -> Self {
        YieldNow { yielded: false }
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Pending once, then ready with its value.
struct Delayed<T> {
    value: Option<T>,
    yielded: bool,
}

fn delayed<T>(value: T) -> Delayed<T> {
    Delayed {
        value: Some(value),
        yielded: false,
    }
}

impl<T: Unpin> Future for Delayed<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Poll::Ready(self.value.take().expect("polled after completion"))
    }
}

/// Fails the test if polled.
struct Unreachable;

impl Future for Unreachable {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        panic!("awaited past an error")
    }
}

#[test]
fn test_no_suspension() {
    #[resumable]
    fn answer() -> impl Future<Output = Result<u32, ()>> {
        Ok(42)
    }

    assert_eq!(block_on(answer()), Ok(42));
}

#[test]
fn test_await() {
    #[resumable]
    fn add_one(x: u32) -> impl Future<Output = Result<u32, ()>> {
        let y = ready(x).await;
        Ok(y + 1)
    }

    assert_eq!(block_on(add_one(1)), Ok(2));
}

#[test]
fn test_try() {
    #[resumable]
    fn double(input: String) -> impl Future<Output = Result<u32, ParseIntError>> {
        let text = ready(input).await;
        let value: u32 = text.parse()?;
        Ok(value * 2)
    }

    assert_eq!(block_on(double("21".to_string())), Ok(42));
    assert!(block_on(double("twenty".to_string())).is_err());
}

#[test]
fn test_pending_resumes() {
    #[resumable]
    fn twice(n: u32) -> impl Future<Output = Result<u32, ()>> {
        YieldNow::new().await;
        let m = n * 2;
        YieldNow::new().await;
        Ok(m)
    }

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut fut = Box::pin(twice(3));

    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(6)));
}

#[test]
fn test_error_skips_later_suspension() {
    #[resumable]
    fn read(fail: bool) -> impl Future<Output = Result<String, io::Error>> {
        let result = if fail {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        } else {
            Ok("text".to_string())
        };
        let text = delayed(result).await?;
        Unreachable.await;
        Ok(text)
    }

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut fut = Box::pin(read(true));

    assert!(fut.as_mut().poll(&mut cx).is_pending());
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(Err(err)) => assert_eq!(err.to_string(), "boom"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
#[should_panic(expected = "polled after completion")]
fn test_poll_after_completion() {
    #[resumable]
    fn once() -> impl Future<Output = Result<(), ()>> {
        YieldNow::new().await;
        Ok(())
    }

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut fut = Box::pin(once());

    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
    let _ = fut.as_mut().poll(&mut cx);
}

#[test]
fn test_loop() {
    #[resumable]
    fn sum(items: Vec<u32>) -> impl Future<Output = Result<u32, ()>> {
        let mut total = 0;
        for item in items {
            let value = ready(item).await;
            total += value;
        }
        Ok(total)
    }

    assert_eq!(block_on(sum(vec![1, 2, 3, 4])), Ok(10));
    assert_eq!(block_on(sum(vec![])), Ok(0));
}

#[test]
fn test_statement_await_in_loops() {
    #[resumable]
    fn count(items: Vec<u32>, extra: Option<u32>) -> impl Future<Output = Result<u32, ()>> {
        let mut polls = 0;
        for _ in items {
            YieldNow::new().await;
            polls += 1;
        }
        if let Some(n) = extra {
            YieldNow::new().await;
            polls += n;
        }
        Ok(polls)
    }

    assert_eq!(block_on(count(vec![1, 2, 3], None)), Ok(3));
    assert_eq!(block_on(count(vec![], Some(10))), Ok(10));

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut fut = Box::pin(count(vec![7], Some(1)));
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(2)));
}

#[test]
fn test_if_else() {
    #[resumable]
    fn pick(flag: bool) -> impl Future<Output = Result<u32, ()>> {
        let n = if flag { ready(1).await } else { ready(2).await };
        Ok(n * 10)
    }

    assert_eq!(block_on(pick(true)), Ok(10));
    assert_eq!(block_on(pick(false)), Ok(20));
}

#[test]
fn test_match() {
    #[resumable]
    fn classify(n: Option<u32>) -> impl Future<Output = Result<String, ()>> {
        let label = match n {
            Some(v) if v > 10 => {
                let doubled = ready(v * 2).await;
                format!("big {}", doubled)
            }
            Some(v) => format!("small {}", v),
            None => String::from("none"),
        };
        if label.len() > 5 {
            YieldNow::new().await;
        }
        Ok(label)
    }

    assert_eq!(block_on(classify(Some(11))), Ok("big 22".to_string()));
    assert_eq!(block_on(classify(Some(3))), Ok("small 3".to_string()));
    assert_eq!(block_on(classify(None)), Ok("none".to_string()));
}

#[test]
fn test_shadowing() {
    #[resumable]
    fn shadow(x: u32) -> impl Future<Output = Result<u32, ()>> {
        let y = x + 1;
        let y = ready(y * 10).await + y;
        Ok(y)
    }

    assert_eq!(block_on(shadow(1)), Ok(22));
}

#[test]
fn test_early_return() {
    #[resumable]
    fn first_even(items: Vec<u32>) -> impl Future<Output = Result<Option<u32>, ()>> {
        for item in items {
            let item = ready(item).await;
            if item % 2 == 0 {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    assert_eq!(block_on(first_even(vec![1, 3, 4, 5])), Ok(Some(4)));
    assert_eq!(block_on(first_even(vec![1, 3])), Ok(None));
}

#[test]
fn test_method() {
    struct Counter {
        base: u32,
    }

    impl Counter {
        #[resumable]
        fn add<'a>(&'a self, n: u32) -> impl Future<Output = Result<u32, ()>> + 'a {
            let n = ready(n).await;
            Ok(self.base + n)
        }
    }

    let counter = Counter { base: 10 };
    assert_eq!(block_on(counter.add(5)), Ok(15));
}

#[test]
fn test_mut_receiver() {
    struct Acc {
        total: u32,
    }

    impl Acc {
        #[resumable]
        fn add(&mut self, n: u32) -> impl Future<Output = Result<u32, ()>> + '_ {
            let n = ready(n).await;
            self.total += n;
            YieldNow::new().await;
            Ok(self.total)
        }
    }

    let mut acc = Acc { total: 1 };
    assert_eq!(block_on(acc.add(2)), Ok(3));
    assert_eq!(block_on(acc.add(4)), Ok(7));
    assert_eq!(acc.total, 7);
}

#[test]
fn test_pattern_param() {
    #[resumable]
    fn sum_pair((a, b): (u32, u32)) -> impl Future<Output = Result<u32, ()>> {
        YieldNow::new().await;
        Ok(a + b)
    }

    assert_eq!(block_on(sum_pair((2, 3))), Ok(5));
}

#[test]
fn test_boxed() {
    #[resumable]
    fn boxed(n: u32) -> Pin<Box<dyn Future<Output = Result<u32, ()>> + Send>> {
        let m = ready(n + 1).await;
        Ok(m)
    }

    #[resumable]
    fn aliased(n: u32) -> BoxFuture<'static, Result<u32, ()>> {
        YieldNow::new().await;
        Ok(n)
    }

    assert_eq!(block_on(boxed(1)), Ok(2));
    assert_eq!(block_on(aliased(7)), Ok(7));
}

#[test]
fn test_movable() {
    #[resumable(movable)]
    fn step(n: u32) -> impl Future<Output = Result<u32, ()>> + Unpin {
        YieldNow::new().await;
        let m = ready(n).await;
        Ok(m + 1)
    }

    let mut cx = Context::from_waker(noop_waker_ref());
    let mut fut = step(1);

    assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending);

    // Unpin, so it may move between polls.
    let mut moved = fut;
    assert_eq!(Pin::new(&mut moved).poll(&mut cx), Poll::Ready(Ok(2)));
}
